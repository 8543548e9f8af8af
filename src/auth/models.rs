use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// What a token grants. Persisted as text in `tokens.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    ForgotPassword,
    Session,
}

impl TokenKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ForgotPassword => "forgotpassword",
            Self::Session => "session",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "forgotpassword" => Ok(Self::ForgotPassword),
            "session" => Ok(Self::Session),
            _ => Err(format!("invalid token kind: {value}")),
        }
    }
}

/// A single-use, time-bounded capability owned by a user.
///
/// `value` is the raw opaque string handed to the client. Stores only keep its
/// hash, so records loaded back from storage carry the value the caller
/// presented, or an empty string when listed without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub user_id: Uuid,
    pub kind: TokenKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
}
