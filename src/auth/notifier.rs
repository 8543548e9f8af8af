//! Reset-token notifications.
//!
//! The services only see [`Notifier`]. In production the notice is written to
//! `email_outbox` and delivered later by the outbox worker in `api::email`;
//! tests use [`MemoryNotifier`] and inspect what would have been sent.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::{info, info_span, Instrument};

pub const RESET_TEMPLATE: &str = "reset_password";

/// A reset token addressed to a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResetNotice {
    pub to_email: String,
    pub token: String,
    /// Last instant at which the token is still accepted.
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Hand the notice off for delivery.
    async fn notify(&self, notice: &ResetNotice) -> Result<()>;
}

/// Build the frontend reset link included in outbound emails.
#[must_use]
pub fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/reset#token={token}")
}

/// Enqueues notices in `email_outbox` for the background worker.
#[derive(Clone, Debug)]
pub struct OutboxNotifier {
    pool: PgPool,
    frontend_base_url: String,
}

impl OutboxNotifier {
    #[must_use]
    pub fn new(pool: PgPool, frontend_base_url: String) -> Self {
        Self {
            pool,
            frontend_base_url,
        }
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn notify(&self, notice: &ResetNotice) -> Result<()> {
        let payload_json = json!({
            "email": notice.to_email,
            "reset_url": build_reset_url(&self.frontend_base_url, &notice.token),
            "expires_at": notice.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        let payload_text =
            serde_json::to_string(&payload_json).context("failed to serialize email payload")?;

        let query = r"
            INSERT INTO email_outbox (to_email, template, payload_json)
            VALUES ($1, $2, $3::jsonb)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&notice.to_email)
            .bind(RESET_TEMPLATE)
            .bind(payload_text)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert email outbox row")?;
        Ok(())
    }
}

/// Logs the notice instead of delivering it.
#[derive(Clone, Debug)]
pub struct LogNotifier {
    frontend_base_url: String,
}

impl LogNotifier {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self { frontend_base_url }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notice: &ResetNotice) -> Result<()> {
        info!(
            to_email = %notice.to_email,
            template = RESET_TEMPLATE,
            reset_url = %build_reset_url(&self.frontend_base_url, &notice.token),
            expires_at = %notice.expires_at,
            "reset notice stub"
        );
        Ok(())
    }
}

/// Records notices in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<ResetNotice>>,
}

impl MemoryNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All notices so far, oldest first.
    pub async fn sent(&self) -> Vec<ResetNotice> {
        self.sent.lock().await.clone()
    }

    /// Remove and return the most recent notice.
    pub async fn pull_recent(&self) -> Option<ResetNotice> {
        self.sent.lock().await.pop()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, notice: &ResetNotice) -> Result<()> {
        self.sent.lock().await.push(notice.clone());
        Ok(())
    }
}
