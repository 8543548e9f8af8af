//! End-to-end password reset and session flows over HTTP, backed by the
//! in-memory store.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use keyturn::api::{app, AuthConfig, AuthState};
use keyturn::auth::{
    Argon2Verifier, CredentialVerifier, ManualClock, MemoryNotifier, MemoryStore, TokenKind,
    TokenStore, User, UserStore,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct Harness {
    router: Router,
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
    notifier: Arc<MemoryNotifier>,
    user: User,
}

impl Harness {
    async fn new() -> Result<Self> {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let notifier = Arc::new(MemoryNotifier::new());
        let verifier = Arc::new(Argon2Verifier::with_params(8, 1, 1)?);

        let user = store.create("u@x.com", &verifier.hash("123456")?).await?;

        let state = AuthState::new(
            AuthConfig::new("http://localhost:3000".to_string()),
            store.clone(),
            store.clone(),
            verifier,
            notifier.clone(),
            clock.clone(),
        )?;

        Ok(Self {
            router: app(Arc::new(state)),
            clock,
            store,
            notifier,
            user,
        })
    }

    async fn post(&self, uri: &str, body: Value) -> Result<(StatusCode, String)> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))?;
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        Ok((status, String::from_utf8(bytes.to_vec())?))
    }

    async fn login(&self, password: &str) -> Result<(StatusCode, String)> {
        self.post(
            "/sessions",
            json!({ "email": "u@x.com", "password": password }),
        )
        .await
    }

    async fn reset(&self, token: &str, password: &str) -> Result<(StatusCode, String)> {
        self.post(
            "/reset",
            json!({
                "token": token,
                "password": password,
                "password_confirmation": password,
            }),
        )
        .await
    }
}

#[tokio::test]
async fn forgot_then_reset_then_login() -> Result<()> {
    let harness = Harness::new().await?;

    let (status, _) = harness
        .post("/forgot", json!({ "email": "u@x.com" }))
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let sent = harness.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to_email, "u@x.com");

    let tokens = harness.store.tokens_for_user(harness.user.id).await?;
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::ForgotPassword);

    let (status, _) = harness.reset(&sent[0].token, "654321").await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = harness.login("654321").await?;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body)?;
    assert!(body["token"].as_str().is_some_and(|token| !token.is_empty()));

    let (status, body) = harness.login("123456").await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(!body.contains("token"));
    Ok(())
}

#[tokio::test]
async fn token_older_than_two_hours_is_rejected() -> Result<()> {
    let harness = Harness::new().await?;
    let (status, _) = harness
        .post("/forgot", json!({ "email": "u@x.com" }))
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let notice = harness
        .notifier
        .pull_recent()
        .await
        .context("no reset notice")?;

    harness.clock.advance(Duration::hours(3));

    let (status, body) = harness.reset(&notice.token, "654321").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid token");

    let (status, _) = harness.login("123456").await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = harness.login("654321").await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn unknown_email_leaves_no_trace() -> Result<()> {
    let harness = Harness::new().await?;

    let (known_status, known_body) = harness
        .post("/forgot", json!({ "email": "u@x.com" }))
        .await?;
    let (unknown_status, unknown_body) = harness
        .post("/forgot", json!({ "email": "ghost@x.com" }))
        .await?;

    assert_eq!(known_status, unknown_status);
    assert_eq!(known_body, unknown_body);
    assert_eq!(harness.notifier.sent().await.len(), 1);
    assert_eq!(harness.store.token_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn session_token_cannot_reset_password() -> Result<()> {
    let harness = Harness::new().await?;
    let (status, body) = harness.login("123456").await?;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body)?;
    let session = body["token"].as_str().context("token missing")?.to_string();

    let (status, body) = harness.reset(&session, "654321").await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid token");
    let (status, _) = harness.login("123456").await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resets_with_one_token() -> Result<()> {
    let harness = Arc::new(Harness::new().await?);
    let (status, _) = harness
        .post("/forgot", json!({ "email": "u@x.com" }))
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let token = harness
        .notifier
        .pull_recent()
        .await
        .context("no reset notice")?
        .token;

    let mut handles = Vec::new();
    for password in ["pw-one", "pw-two", "pw-three", "pw-four"] {
        let harness = harness.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            harness.reset(&token, password).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        let (status, _) = handle.await??;
        if status == StatusCode::NO_CONTENT {
            successes += 1;
        } else {
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(harness.store.token_count().await, 0);
    Ok(())
}
