//! Login: verify credentials and issue a session token.

use anyhow::Context;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::credentials::CredentialVerifier;
use super::error::{AuthError, Result};
use super::models::{Token, TokenKind};
use super::store::{TokenStore, UserStore};
use super::utils::normalize_email;

// Unknown emails are checked against this so both failure paths cost one
// password verification.
const DUMMY_PASSWORD: &str = "keyturn-dummy-password";

#[derive(Clone)]
pub struct SessionService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
    verifier: Arc<dyn CredentialVerifier>,
    dummy_hash: Arc<str>,
}

impl SessionService {
    /// # Errors
    /// Returns an error if the verifier cannot hash the dummy password.
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> anyhow::Result<Self> {
        let dummy_hash = verifier
            .hash(DUMMY_PASSWORD)
            .context("failed to prepare dummy hash")?;
        Ok(Self {
            users,
            tokens,
            verifier,
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    /// Verify the credentials and issue a `session` token.
    ///
    /// # Errors
    /// `Authentication` when the email is unknown or the password is wrong
    /// (indistinguishable), `Internal` on store failure.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<Token> {
        let email = normalize_email(email);
        let password = password.expose_secret();

        let Some(user) = self.users.find_by_email(&email).await? else {
            let _ = self.verifier.verify(password, &self.dummy_hash);
            debug!("login for unknown email");
            return Err(AuthError::Authentication);
        };

        if !self.verifier.verify(password, &user.password_hash) {
            debug!(user_id = %user.id, "login with wrong password");
            return Err(AuthError::Authentication);
        }

        let token = self.tokens.issue(user.id, TokenKind::Session).await?;
        info!(user_id = %user.id, "session created");
        Ok(token)
    }
}
