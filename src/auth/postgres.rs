//! PostgreSQL-backed user and token storage.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use std::sync::Arc;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::clock::Clock;
use super::models::{Token, TokenKind, User};
use super::store::{generate_token_value, hash_token_value, TokenStore, UserStore};

const ISSUE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn token_from_row(row: &PgRow, value: String) -> Result<Token> {
    let kind: String = row.try_get("kind")?;
    Ok(Token {
        value,
        user_id: row.try_get("user_id")?,
        kind: kind.parse().map_err(|e: String| anyhow!(e))?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = "SELECT id, email, password_hash FROM users WHERE email = $1";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup user by email")?;

        row.map(|row| -> Result<User> {
            Ok(User {
                id: row.try_get("id")?,
                email: row.try_get("email")?,
                password_hash: row.try_get("password_hash")?,
            })
        })
        .transpose()
    }

    async fn create(&self, email: &str, password_hash: &str) -> Result<User> {
        let query = r"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id
        ";
        let row = sqlx::query(query)
            .bind(email)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert user")?;

        Ok(User {
            id: row.try_get("id")?,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
        })
    }

    async fn ping(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn issue(&self, user_id: Uuid, kind: TokenKind) -> Result<Token> {
        let query = r"
            INSERT INTO tokens (token_hash, user_id, kind, created_at)
            VALUES ($1, $2, $3, $4)
        ";
        let created_at = self.clock.now();

        // Retry on a token_hash collision.
        for _ in 0..ISSUE_ATTEMPTS {
            let value = generate_token_value()?;
            let result = sqlx::query(query)
                .bind(hash_token_value(&value))
                .bind(user_id)
                .bind(kind.as_str())
                .bind(created_at)
                .execute(&self.pool)
                .instrument(db_span("INSERT", query))
                .await;

            match result {
                Ok(_) => {
                    return Ok(Token {
                        value,
                        user_id,
                        kind,
                        created_at,
                    })
                }
                Err(err) if is_unique_violation(&err) => {}
                Err(err) => return Err(err).context("failed to insert token"),
            }
        }

        Err(anyhow!("failed to generate unique token"))
    }

    async fn find_by_value(&self, value: &str) -> Result<Option<Token>> {
        let query = "SELECT user_id, kind, created_at FROM tokens WHERE token_hash = $1";
        let row = sqlx::query(query)
            .bind(hash_token_value(value))
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup token")?;

        row.map(|row| token_from_row(&row, value.to_string()))
            .transpose()
    }

    async fn invalidate(&self, token: &Token) -> Result<()> {
        // Idempotent; it's fine if no rows are deleted.
        let query = "DELETE FROM tokens WHERE token_hash = $1";
        sqlx::query(query)
            .bind(hash_token_value(&token.value))
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete token")?;
        Ok(())
    }

    async fn consume_for_reset(&self, token: &Token, password_hash: &str) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin reset transaction")?;

        // The DELETE row lock serializes concurrent redemptions of one token:
        // the loser sees zero rows once the winner commits.
        let query = r"
            DELETE FROM tokens
            WHERE token_hash = $1
              AND kind = 'forgotpassword'
            RETURNING user_id
        ";
        let row = sqlx::query(query)
            .bind(hash_token_value(&token.value))
            .fetch_optional(&mut *tx)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to consume reset token")?;

        let Some(row) = row else {
            let _ = tx.rollback().await;
            return Ok(false);
        };
        let user_id: Uuid = row.try_get("user_id")?;

        let query = r"
            UPDATE users
            SET password_hash = $2,
                updated_at = NOW()
            WHERE id = $1
        ";
        let updated = sqlx::query(query)
            .bind(user_id)
            .bind(password_hash)
            .execute(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to update password")?;

        if updated.rows_affected() == 0 {
            let _ = tx.rollback().await;
            return Ok(false);
        }

        tx.commit().await.context("commit reset transaction")?;
        Ok(true)
    }

    async fn tokens_for_user(&self, user_id: Uuid) -> Result<Vec<Token>> {
        let query = r"
            SELECT user_id, kind, created_at
            FROM tokens
            WHERE user_id = $1
            ORDER BY created_at DESC
        ";
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to list tokens")?;

        rows.iter()
            .map(|row| token_from_row(row, String::new()))
            .collect()
    }
}
