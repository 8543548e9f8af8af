//! Password hashing and verification.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

/// Compares plaintext secrets against stored hashes and hashes new secrets.
pub trait CredentialVerifier: Send + Sync {
    /// Returns `false` on mismatch and on a stored hash that cannot be parsed.
    fn verify(&self, plaintext: &str, stored_hash: &str) -> bool;

    /// Hash a new secret for storage.
    ///
    /// # Errors
    /// Returns an error if the hasher rejects the input or parameters.
    fn hash(&self, plaintext: &str) -> Result<String>;
}

/// Argon2id PHC-string verifier.
#[derive(Clone)]
pub struct Argon2Verifier {
    argon2: Argon2<'static>,
}

impl Argon2Verifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Build with explicit cost parameters (memory KiB, iterations, lanes).
    ///
    /// # Errors
    /// Returns an error if argon2 rejects the parameter combination.
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| anyhow!("invalid argon2 params: {e}"))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl Default for Argon2Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Argon2Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2Verifier").finish_non_exhaustive()
    }
}

impl CredentialVerifier for Argon2Verifier {
    fn verify(&self, plaintext: &str, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            return false;
        };
        self.argon2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| anyhow!("failed to hash password: {e}"))
    }
}
