//! Email outbox worker.
//!
//! `OutboxNotifier` enqueues reset notices in `email_outbox` with status
//! `pending`. This worker polls the table, locks a batch with
//! `FOR UPDATE SKIP LOCKED`, renders each row and hands it to a [`MailSender`].
//! Delivered rows become `sent`; failures are rescheduled with exponential
//! backoff and jitter until `max_attempts`, then marked `failed`.
//!
//! The default sender, [`LogMailSender`], only logs the rendered message.
use anyhow::{anyhow, Context, Result};
use rand::Rng;
use serde::Deserialize;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::auth::notifier::RESET_TEMPLATE;

/// A rendered message ready for delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mail {
    pub to_email: String,
    pub subject: String,
    pub body: String,
}

#[derive(Deserialize)]
struct ResetPayload {
    reset_url: String,
    #[serde(default)]
    expires_at: Option<String>,
}

/// Turn an outbox row into a message.
///
/// # Errors
/// Returns an error for unknown templates or payloads missing required fields.
pub fn render(to_email: &str, template: &str, payload_json: &str) -> Result<Mail> {
    match template {
        RESET_TEMPLATE => {
            let payload: ResetPayload =
                serde_json::from_str(payload_json).context("invalid reset_password payload")?;
            let expiry = payload.expires_at.map_or_else(
                || "The link works once and expires shortly.".to_string(),
                |at| format!("The link works once and expires at {at}."),
            );
            Ok(Mail {
                to_email: to_email.to_string(),
                subject: "Reset your password".to_string(),
                body: format!(
                    "Someone asked to reset the password for this account.\n\n\
                     Follow this link to choose a new one:\n{}\n\n\
                     {expiry}\n\n\
                     If this wasn't you, ignore this email.",
                    payload.reset_url
                ),
            })
        }
        other => Err(anyhow!("unknown email template: {other}")),
    }
}

/// Delivery abstraction used by the outbox worker.
pub trait MailSender: Send + Sync {
    /// Deliver a message or return an error to schedule a retry.
    fn send(&self, mail: &Mail) -> Result<()>;
}

/// Local sender that logs the message instead of sending it.
#[derive(Clone, Debug)]
pub struct LogMailSender;

impl MailSender for LogMailSender {
    fn send(&self, mail: &Mail) -> Result<()> {
        info!(
            to_email = %mail.to_email,
            subject = %mail.subject,
            body = %mail.body,
            "email outbox send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OutboxWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl OutboxWorkerConfig {
    /// 5s poll, 10 rows per batch, 5 attempts, 5s to 5m backoff.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds);
        self
    }

    /// Clamp zero values to one and keep `backoff_max >= backoff_base`.
    #[must_use]
    pub fn normalize(self) -> Self {
        let one_second = Duration::from_secs(1);
        let backoff_base = self.backoff_base.max(one_second);
        Self {
            poll_interval: self.poll_interval.max(one_second),
            batch_size: self.batch_size.max(1),
            max_attempts: self.max_attempts.max(1),
            backoff_base,
            backoff_max: self.backoff_max.max(backoff_base),
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        self.backoff_max
    }
}

impl Default for OutboxWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What happens to a row after a delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Sent { attempts: u32 },
    Retry { attempts: u32, delay: Duration },
    Failed { attempts: u32 },
}

fn outcome(previous_attempts: u32, delivered: bool, config: &OutboxWorkerConfig) -> Outcome {
    let attempts = previous_attempts.saturating_add(1);
    if delivered {
        Outcome::Sent { attempts }
    } else if attempts >= config.max_attempts() {
        Outcome::Failed { attempts }
    } else {
        Outcome::Retry {
            attempts,
            delay: backoff_delay(attempts, config.backoff_base(), config.backoff_max()),
        }
    }
}

/// Spawn a background task that polls and processes the email outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn MailSender>,
    config: OutboxWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();

        loop {
            match process_outbox_batch(&pool, sender.as_ref(), &config).await {
                Ok(0) => {}
                Ok(count) => debug!(count, "email outbox batch processed"),
                Err(err) => error!("email outbox batch failed: {err:#}"),
            }

            sleep(config.poll_interval()).await;
        }
    })
}

async fn process_outbox_batch(
    pool: &PgPool,
    sender: &dyn MailSender,
    config: &OutboxWorkerConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start email outbox transaction")?;

    let query = r"
        SELECT id, to_email, template, payload_json::text AS payload_json, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size()).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load email outbox batch")?;

    let row_count = rows.len();
    for row in rows {
        let id: Uuid = row.get("id");
        let attempts: i32 = row.get("attempts");
        let to_email: String = row.get("to_email");
        let template: String = row.get("template");
        let payload_json: String = row.get("payload_json");

        let result = render(&to_email, &template, &payload_json).and_then(|mail| sender.send(&mail));
        let last_error = result.as_ref().err().map(|err| format!("{err:#}"));
        let next = outcome(
            u32::try_from(attempts).unwrap_or(0),
            result.is_ok(),
            config,
        );
        record_outcome(&mut tx, id, next, last_error.as_deref()).await?;
    }

    // Commit even an empty batch to release the locks.
    tx.commit()
        .await
        .context("failed to commit email outbox batch")?;

    Ok(row_count)
}

async fn record_outcome(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    outcome: Outcome,
    last_error: Option<&str>,
) -> Result<()> {
    let (query, attempts, delay) = match outcome {
        Outcome::Sent { attempts } => (
            r"
                UPDATE email_outbox
                SET status = 'sent',
                    attempts = $2,
                    last_error = $3,
                    sent_at = NOW(),
                    next_attempt_at = NOW()
                WHERE id = $1
            ",
            attempts,
            Duration::ZERO,
        ),
        Outcome::Retry { attempts, delay } => (
            r"
                UPDATE email_outbox
                SET status = 'pending',
                    attempts = $2,
                    last_error = $3,
                    next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
                WHERE id = $1
            ",
            attempts,
            delay,
        ),
        Outcome::Failed { attempts } => (
            r"
                UPDATE email_outbox
                SET status = 'failed',
                    attempts = $2,
                    last_error = $3,
                    next_attempt_at = NOW()
                WHERE id = $1
            ",
            attempts,
            Duration::ZERO,
        ),
    };

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let mut statement = sqlx::query(query)
        .bind(id)
        .bind(i32::try_from(attempts).unwrap_or(i32::MAX))
        .bind(last_error);
    if matches!(outcome, Outcome::Retry { .. }) {
        statement = statement.bind(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));
    }
    statement
        .execute(&mut **tx)
        .instrument(span)
        .await
        .with_context(|| format!("failed to record email outbox outcome {outcome:?}"))?;

    Ok(())
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let delay = base.checked_mul(1u32 << shift).unwrap_or(max);
    jitter_delay(delay.min(max))
}

/// Pick uniformly from `[delay / 2, delay]`.
fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=delay_ms - half);
    Duration::from_millis(half + jitter)
}
