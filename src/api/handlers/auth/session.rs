//! Session creation endpoint.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use secrecy::SecretString;
use std::sync::Arc;

use super::state::AuthState;
use super::types::{SessionRequest, SessionResponse};
use super::utils::auth_error_response;

/// Exchange email and password for a session token.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = SessionRequest,
    responses(
        (status = 200, description = "Session created", body = SessionResponse),
        (status = 400, description = "Missing payload", body = String),
        (status = 401, description = "Invalid credentials", body = String)
    ),
    tag = "auth"
)]
pub async fn create_session(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SessionRequest>>,
) -> impl IntoResponse {
    let request: SessionRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let password = SecretString::from(request.password);
    match auth_state.sessions().login(&request.email, &password).await {
        Ok(token) => (
            StatusCode::OK,
            Json(SessionResponse { token: token.value }),
        )
            .into_response(),
        Err(err) => auth_error_response(&err).into_response(),
    }
}
