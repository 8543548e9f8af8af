use crate::auth::{Argon2Verifier, OutboxNotifier, PgStore, SystemClock};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::options,
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

pub mod email;
pub mod handlers;
mod openapi;

pub use handlers::auth::{AuthConfig, AuthState};
pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// The full application: documented routes, `OPTIONS /health` and the
/// request-id/tracing layers, with `auth_state` shared by every handler.
pub fn app(auth_state: Arc<AuthState>) -> Router {
    let (router, _openapi) = router().split_for_parts();
    router
        .route("/health", options(handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(auth_state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to connect to the database or to start the server
pub async fn new(
    port: u16,
    dsn: String,
    auth_config: AuthConfig,
    email_config: email::OutboxWorkerConfig,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let clock = Arc::new(SystemClock);
    let store = Arc::new(PgStore::new(pool.clone(), clock.clone()));
    let notifier = Arc::new(OutboxNotifier::new(
        pool.clone(),
        auth_config.frontend_base_url().to_string(),
    ));
    let auth_state = Arc::new(AuthState::new(
        auth_config,
        store.clone(),
        store,
        Arc::new(Argon2Verifier::new()),
        notifier,
        clock,
    )?);

    email::spawn_outbox_worker(pool, Arc::new(email::LogMailSender), email_config);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app(auth_state).into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
