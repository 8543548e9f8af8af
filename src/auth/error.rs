use thiserror::Error;

/// Failures surfaced by the reset and session services.
///
/// Token failures stay distinct here so callers and logs can tell them apart;
/// the HTTP layer collapses them into one client error.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("token not found")]
    NotFound,
    #[error("token expired")]
    ExpiredToken,
    #[error("invalid token kind")]
    InvalidTokenKind,
    #[error("invalid credentials")]
    Authentication,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// True for the rejections a client caused by presenting a bad token.
    #[must_use]
    pub const fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::ExpiredToken | Self::InvalidTokenKind
        )
    }
}

pub type Result<T, E = AuthError> = std::result::Result<T, E>;
