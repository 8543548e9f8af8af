//! Forgot-password and reset-password endpoints.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use secrecy::SecretString;
use std::sync::Arc;

use super::state::AuthState;
use super::types::{ForgotPasswordRequest, ResetPasswordRequest};
use super::utils::auth_error_response;

/// Request a password reset email.
///
/// Known and unknown addresses get the same response.
#[utoipa::path(
    post,
    path = "/forgot",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 204, description = "Request accepted"),
        (status = 400, description = "Missing payload", body = String),
        (status = 500, description = "Internal error", body = String)
    ),
    tag = "auth"
)]
pub async fn forgot(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> impl IntoResponse {
    let request: ForgotPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match auth_state.resets().request_reset(&request.email).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => auth_error_response(&err).into_response(),
    }
}

/// Redeem a reset token and set a new password.
#[utoipa::path(
    post,
    path = "/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password updated"),
        (status = 400, description = "Invalid token or password confirmation mismatch", body = String),
        (status = 500, description = "Internal error", body = String)
    ),
    tag = "auth"
)]
pub async fn reset(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let request: ResetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let token = request.token.trim();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing token".to_string()).into_response();
    }

    let password = SecretString::from(request.password);
    let confirmation = SecretString::from(request.password_confirmation);

    match auth_state
        .resets()
        .reset_password(token, &password, &confirmation)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => auth_error_response(&err).into_response(),
    }
}
