//! Auth handler tests against the in-memory store.

use super::{AuthConfig, AuthState};
use crate::api::app;
use crate::auth::{
    Argon2Verifier, CredentialVerifier, ManualClock, MemoryNotifier, MemoryStore, Notifier,
    ResetNotice, TokenKind, TokenStore, UserStore,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
    notifier: Arc<MemoryNotifier>,
    verifier: Arc<Argon2Verifier>,
}

impl TestApp {
    async fn new() -> Result<Self> {
        let notifier = Arc::new(MemoryNotifier::new());
        Self::with_delivery(notifier.clone(), notifier).await
    }

    /// `delivery` receives the notices; `notifier` is what the test inspects.
    async fn with_delivery(
        delivery: Arc<dyn Notifier>,
        notifier: Arc<MemoryNotifier>,
    ) -> Result<Self> {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let verifier = Arc::new(Argon2Verifier::with_params(8, 1, 1)?);

        store.create("u@x.com", &verifier.hash("123456")?).await?;

        let state = AuthState::new(
            AuthConfig::new("https://keyturn.dev".to_string()),
            store.clone(),
            store.clone(),
            verifier.clone(),
            delivery,
            clock.clone(),
        )?;

        Ok(Self {
            router: app(Arc::new(state)),
            clock,
            store,
            notifier,
            verifier,
        })
    }

    async fn post(&self, uri: &str, body: &Value) -> Result<(StatusCode, String)> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body)?))?;
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> Result<(StatusCode, String)> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        Ok((status, String::from_utf8(bytes.to_vec())?))
    }

    async fn reset_token(&self) -> Result<String> {
        let (status, _) = self.post("/forgot", &json!({ "email": "u@x.com" })).await?;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let notice = self
            .notifier
            .pull_recent()
            .await
            .context("no reset notice sent")?;
        Ok(notice.token)
    }

    async fn password_is(&self, password: &str) -> Result<bool> {
        let user = self
            .store
            .find_by_email("u@x.com")
            .await?
            .context("user missing")?;
        Ok(self.verifier.verify(password, &user.password_hash))
    }
}

fn reset_body(token: &str, password: &str, confirmation: &str) -> Value {
    json!({
        "token": token,
        "password": password,
        "password_confirmation": confirmation,
    })
}

#[tokio::test]
async fn forgot_known_email_sends_one_notice() -> Result<()> {
    let app = TestApp::new().await?;

    let (status, body) = app.post("/forgot", &json!({ "email": "u@x.com" })).await?;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
    let sent = app.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to_email, "u@x.com");
    assert_eq!(app.store.token_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn forgot_unknown_email_looks_the_same() -> Result<()> {
    let app = TestApp::new().await?;

    let (status, body) = app
        .post("/forgot", &json!({ "email": "nobody@x.com" }))
        .await?;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
    assert!(app.notifier.sent().await.is_empty());
    assert_eq!(app.store.token_count().await, 0);
    Ok(())
}

struct MailDown;

#[async_trait::async_trait]
impl Notifier for MailDown {
    async fn notify(&self, _notice: &ResetNotice) -> Result<()> {
        Err(anyhow::anyhow!("mail down"))
    }
}

#[tokio::test]
async fn forgot_fails_cleanly_when_mail_is_down() -> Result<()> {
    let app = TestApp::with_delivery(Arc::new(MailDown), Arc::new(MemoryNotifier::new())).await?;

    let (status, body) = app.post("/forgot", &json!({ "email": "u@x.com" })).await?;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Internal server error");
    assert_eq!(app.store.token_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn forgot_without_body_is_bad_request() -> Result<()> {
    let app = TestApp::new().await?;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/forgot")
        .body(Body::empty())?;

    let (status, body) = app.send(request).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Missing payload");
    Ok(())
}

#[tokio::test]
async fn reset_updates_password() -> Result<()> {
    let app = TestApp::new().await?;
    let token = app.reset_token().await?;

    let (status, _) = app
        .post("/reset", &reset_body(&token, "654321", "654321"))
        .await?;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(app.password_is("654321").await?);
    assert_eq!(app.store.token_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn reset_confirmation_mismatch() -> Result<()> {
    let app = TestApp::new().await?;
    let token = app.reset_token().await?;

    let (status, body) = app
        .post("/reset", &reset_body(&token, "654321", "654322"))
        .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Password confirmation does not match");
    assert!(app.password_is("123456").await?);
    assert!(app.store.find_by_value(&token).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn reset_token_is_single_use() -> Result<()> {
    let app = TestApp::new().await?;
    let token = app.reset_token().await?;

    let (first, _) = app
        .post("/reset", &reset_body(&token, "654321", "654321"))
        .await?;
    let (second, body) = app
        .post("/reset", &reset_body(&token, "abcdef", "abcdef"))
        .await?;

    assert_eq!(first, StatusCode::NO_CONTENT);
    assert_eq!(second, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid token");
    assert!(app.password_is("654321").await?);
    Ok(())
}

#[tokio::test]
async fn reset_expiry_boundary() -> Result<()> {
    let app = TestApp::new().await?;
    let token = app.reset_token().await?;

    app.clock.advance(Duration::seconds(7200));
    let (status, _) = app
        .post("/reset", &reset_body(&token, "654321", "654321"))
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let token = app.reset_token().await?;
    app.clock.advance(Duration::seconds(7201));
    let (status, body) = app
        .post("/reset", &reset_body(&token, "abcdef", "abcdef"))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid token");
    assert!(app.password_is("654321").await?);
    Ok(())
}

#[tokio::test]
async fn reset_rejects_unknown_and_missing_token() -> Result<()> {
    let app = TestApp::new().await?;

    let (status, body) = app
        .post("/reset", &reset_body("does-not-exist", "654321", "654321"))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid token");

    let (status, body) = app
        .post("/reset", &reset_body("  ", "654321", "654321"))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Missing token");
    Ok(())
}

#[tokio::test]
async fn sessions_issue_token_for_valid_credentials() -> Result<()> {
    let app = TestApp::new().await?;

    let (status, body) = app
        .post(
            "/sessions",
            &json!({ "email": "u@x.com", "password": "123456" }),
        )
        .await?;

    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body)?;
    let token = body["token"].as_str().context("token missing")?;
    let stored = app.store.find_by_value(token).await?;
    assert_eq!(stored.map(|t| t.kind), Some(TokenKind::Session));
    Ok(())
}

#[tokio::test]
async fn sessions_reject_bad_credentials_uniformly() -> Result<()> {
    let app = TestApp::new().await?;

    let (wrong_status, wrong_body) = app
        .post(
            "/sessions",
            &json!({ "email": "u@x.com", "password": "000000" }),
        )
        .await?;
    let (unknown_status, unknown_body) = app
        .post(
            "/sessions",
            &json!({ "email": "nobody@x.com", "password": "123456" }),
        )
        .await?;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, unknown_body);
    assert_eq!(wrong_body, "Invalid credentials");
    assert_eq!(app.store.token_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn health_reports_ok_with_request_id() -> Result<()> {
    let app = TestApp::new().await?;
    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .body(Body::empty())?;

    let response = app.router.clone().oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers().contains_key("x-app"));
    let bytes = response.into_body().collect().await?.to_bytes();
    let body: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(body["database"], "ok");
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    Ok(())
}

#[tokio::test]
async fn health_options_has_empty_body() -> Result<()> {
    let app = TestApp::new().await?;
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/health")
        .body(Body::empty())?;

    let (status, body) = app.send(request).await?;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    Ok(())
}

#[tokio::test]
async fn request_id_is_propagated() -> Result<()> {
    let app = TestApp::new().await?;
    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .header("x-request-id", "req-123")
        .body(Body::empty())?;

    let response = app.router.clone().oneshot(request).await?;

    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("req-123")
    );
    Ok(())
}
