//! In-process store for tests and local runs.
//!
//! Users and tokens share one lock, which is what makes `consume_for_reset`
//! atomic here.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::clock::Clock;
use super::models::{Token, TokenKind, User};
use super::store::{generate_token_value, hash_token_value, TokenStore, UserStore};

#[derive(Debug, Clone)]
struct StoredToken {
    user_id: Uuid,
    kind: TokenKind,
    created_at: chrono::DateTime<chrono::Utc>,
    seq: u64,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    tokens: HashMap<Vec<u8>, StoredToken>,
    next_seq: u64,
}

pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tables: Mutex::new(Tables::default()),
        }
    }

    /// Current password hash for a user, if the user exists.
    pub async fn password_hash(&self, user_id: Uuid) -> Option<String> {
        let tables = self.tables.lock().await;
        tables
            .users
            .get(&user_id)
            .map(|user| user.password_hash.clone())
    }

    pub async fn token_count(&self) -> usize {
        self.tables.lock().await.tokens.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn create(&self, email: &str, password_hash: &str) -> Result<User> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|user| user.email == email) {
            return Err(anyhow!("user with email {email} already exists"));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn issue(&self, user_id: Uuid, kind: TokenKind) -> Result<Token> {
        let created_at = self.clock.now();
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&user_id) {
            return Err(anyhow!("unknown user {user_id}"));
        }

        loop {
            let value = generate_token_value()?;
            let hash = hash_token_value(&value);
            if tables.tokens.contains_key(&hash) {
                continue;
            }
            let seq = tables.next_seq;
            tables.next_seq += 1;
            tables.tokens.insert(
                hash,
                StoredToken {
                    user_id,
                    kind,
                    created_at,
                    seq,
                },
            );
            return Ok(Token {
                value,
                user_id,
                kind,
                created_at,
            });
        }
    }

    async fn find_by_value(&self, value: &str) -> Result<Option<Token>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tokens
            .get(&hash_token_value(value))
            .map(|stored| Token {
                value: value.to_string(),
                user_id: stored.user_id,
                kind: stored.kind,
                created_at: stored.created_at,
            }))
    }

    async fn invalidate(&self, token: &Token) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.tokens.remove(&hash_token_value(&token.value));
        Ok(())
    }

    async fn consume_for_reset(&self, token: &Token, password_hash: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let hash = hash_token_value(&token.value);

        let owner = match tables.tokens.get(&hash) {
            Some(stored) if stored.kind == TokenKind::ForgotPassword => stored.user_id,
            _ => return Ok(false),
        };
        let Some(user) = tables.users.get_mut(&owner) else {
            return Ok(false);
        };
        user.password_hash = password_hash.to_string();
        tables.tokens.remove(&hash);
        Ok(true)
    }

    async fn tokens_for_user(&self, user_id: Uuid) -> Result<Vec<Token>> {
        let tables = self.tables.lock().await;
        let mut owned: Vec<&StoredToken> = tables
            .tokens
            .values()
            .filter(|stored| stored.user_id == user_id)
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.seq.cmp(&a.seq)));
        Ok(owned
            .into_iter()
            .map(|stored| Token {
                value: String::new(),
                user_id: stored.user_id,
                kind: stored.kind,
                created_at: stored.created_at,
            })
            .collect())
    }
}
