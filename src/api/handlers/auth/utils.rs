use axum::http::StatusCode;
use tracing::error;

use crate::auth::AuthError;

pub(crate) const INVALID_TOKEN: &str = "Invalid token";
pub(crate) const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Map a service failure to the status and body sent to the client.
///
/// Token rejections share one body so a caller cannot probe which tokens
/// exist or when they were issued.
pub(crate) fn auth_error_response(err: &AuthError) -> (StatusCode, String) {
    match err {
        AuthError::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
        AuthError::NotFound | AuthError::ExpiredToken | AuthError::InvalidTokenKind => {
            (StatusCode::BAD_REQUEST, INVALID_TOKEN.to_string())
        }
        AuthError::Authentication => (StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS.to_string()),
        AuthError::Internal(source) => {
            error!("auth request failed: {source:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}
