//! Forgot-password and reset-password flows.

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::clock::Clock;
use super::credentials::CredentialVerifier;
use super::error::{AuthError, Result};
use super::models::TokenKind;
use super::notifier::{Notifier, ResetNotice};
use super::store::{TokenStore, UserStore};
use super::utils::reset_lookup_key;

/// Reset tokens are accepted up to and including this age.
pub const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 2 * 60 * 60;

#[derive(Clone)]
pub struct PasswordResetService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
    verifier: Arc<dyn CredentialVerifier>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    token_ttl: Duration,
}

impl PasswordResetService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        verifier: Arc<dyn CredentialVerifier>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            tokens,
            verifier,
            notifier,
            clock,
            token_ttl: Duration::seconds(DEFAULT_RESET_TOKEN_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// Issue a `forgotpassword` token for the account and notify its owner.
    ///
    /// Unknown or malformed emails return `Ok(())` without side effects so the
    /// outcome never reveals whether an account exists.
    ///
    /// # Errors
    /// Returns `AuthError::Internal` if the store or notifier fails. A token
    /// whose notice could not be handed off is removed again.
    #[instrument(skip_all)]
    pub async fn request_reset(&self, email: &str) -> Result<()> {
        let Some(email) = reset_lookup_key(email) else {
            debug!("reset requested for malformed email");
            return Ok(());
        };

        let Some(user) = self.users.find_by_email(&email).await? else {
            debug!("reset requested for unknown email");
            return Ok(());
        };

        let token = self
            .tokens
            .issue(user.id, TokenKind::ForgotPassword)
            .await?;

        let notice = ResetNotice {
            to_email: user.email,
            token: token.value.clone(),
            expires_at: token.created_at + self.token_ttl,
        };

        if let Err(err) = self.notifier.notify(&notice).await {
            // An undelivered token must not stay redeemable.
            if let Err(cleanup) = self.tokens.invalidate(&token).await {
                warn!(user_id = %user.id, "failed to remove undelivered reset token: {cleanup:#}");
            }
            return Err(AuthError::Internal(err));
        }

        info!(user_id = %user.id, "reset token issued");
        Ok(())
    }

    /// Redeem a reset token and replace the owner's password.
    ///
    /// # Errors
    /// `Validation` when the confirmation differs or the password is empty,
    /// `NotFound` for unknown or already used tokens, `ExpiredToken` past the
    /// TTL, `InvalidTokenKind` for non-reset tokens, `Internal` on store failure.
    #[instrument(skip_all)]
    pub async fn reset_password(
        &self,
        token_value: &str,
        password: &SecretString,
        confirmation: &SecretString,
    ) -> Result<()> {
        let password = password.expose_secret();
        if password != confirmation.expose_secret() {
            return Err(AuthError::Validation(
                "Password confirmation does not match".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(AuthError::Validation("Password is required".to_string()));
        }

        let token = self
            .tokens
            .find_by_value(token_value)
            .await?
            .ok_or(AuthError::NotFound)?;

        let elapsed = self.clock.now() - token.created_at;
        if elapsed > self.token_ttl {
            debug!(user_id = %token.user_id, elapsed = elapsed.num_seconds(), "reset token expired");
            return Err(AuthError::ExpiredToken);
        }

        if token.kind != TokenKind::ForgotPassword {
            debug!(user_id = %token.user_id, kind = %token.kind, "wrong token kind for reset");
            return Err(AuthError::InvalidTokenKind);
        }

        let password_hash = self.verifier.hash(password)?;
        if !self
            .tokens
            .consume_for_reset(&token, &password_hash)
            .await?
        {
            // Another request redeemed it between lookup and consume.
            return Err(AuthError::NotFound);
        }

        info!(user_id = %token.user_id, "password reset");
        Ok(())
    }
}
