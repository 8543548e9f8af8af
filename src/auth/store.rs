//! Persistence seams for users and tokens.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::models::{Token, TokenKind, User};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by already-normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Insert a user with an already-hashed password.
    async fn create(&self, email: &str, password_hash: &str) -> Result<User>;

    /// Cheap round trip used by `/health`.
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Generate a random value, stamp it with the store clock and persist it.
    async fn issue(&self, user_id: Uuid, kind: TokenKind) -> Result<Token>;

    async fn find_by_value(&self, value: &str) -> Result<Option<Token>>;

    /// Remove a token. Removing an absent token is not an error.
    async fn invalidate(&self, token: &Token) -> Result<()>;

    /// Remove a `forgotpassword` token and store the owner's new password hash
    /// as one unit. Returns `false`, writing nothing, when the token is gone.
    async fn consume_for_reset(&self, token: &Token, password_hash: &str) -> Result<bool>;

    /// Tokens owned by a user, newest first, without raw values.
    async fn tokens_for_user(&self, user_id: Uuid) -> Result<Vec<Token>>;
}

/// Create a new opaque token value.
///
/// Returned value is only handed to the client; stores keep a hash.
pub(crate) fn generate_token_value() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a token value so raw values never touch storage.
pub(crate) fn hash_token_value(value: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().to_vec()
}
