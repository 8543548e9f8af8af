//! Auth state and configuration shared by the handlers.

use anyhow::Result;
use std::sync::Arc;

use crate::auth::{
    Clock, CredentialVerifier, Notifier, PasswordResetService, SessionService, TokenStore,
    UserStore, DEFAULT_RESET_TOKEN_TTL_SECONDS,
};

const DEFAULT_FRONTEND_BASE_URL: &str = "https://keyturn.dev";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    reset_token_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FRONTEND_BASE_URL.to_string())
    }
}

/// Everything the auth handlers need, wired once at startup.
#[derive(Clone)]
pub struct AuthState {
    config: AuthConfig,
    users: Arc<dyn UserStore>,
    resets: PasswordResetService,
    sessions: SessionService,
}

impl AuthState {
    /// # Errors
    /// Returns an error if the session service cannot be prepared.
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        verifier: Arc<dyn CredentialVerifier>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let resets = PasswordResetService::new(
            users.clone(),
            tokens.clone(),
            verifier.clone(),
            notifier,
            clock,
        )
        .with_token_ttl(chrono::Duration::seconds(config.reset_token_ttl_seconds()));
        let sessions = SessionService::new(users.clone(), tokens, verifier)?;

        Ok(Self {
            config,
            users,
            resets,
            sessions,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    #[must_use]
    pub fn resets(&self) -> &PasswordResetService {
        &self.resets
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_two_hour_ttl() {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        assert_eq!(config.reset_token_ttl_seconds(), 7200);
        assert_eq!(config.frontend_base_url(), "http://localhost:3000");
    }

    #[test]
    fn config_overrides_ttl() {
        let config = AuthConfig::default().with_reset_token_ttl_seconds(60);
        assert_eq!(config.reset_token_ttl_seconds(), 60);
        assert_eq!(config.frontend_base_url(), DEFAULT_FRONTEND_BASE_URL);
    }
}
