//! # Keyturn (password reset and session tokens)
//!
//! `keyturn` lets a user who forgot their password prove control of their
//! email address and pick a new one, and lets a user with valid credentials
//! obtain a session token.
//!
//! ## Password reset
//!
//! `POST /forgot` issues a single-use `forgotpassword` token for a known email
//! and hands it to the notifier. The endpoint answers the same way whether or
//! not the email belongs to an account, so it cannot be used to enumerate
//! users.
//!
//! `POST /reset` redeems the token within its TTL (2 hours by default). The
//! token is consumed and the new password hash written in one transaction.
//!
//! ## Sessions
//!
//! `POST /sessions` verifies credentials and returns a fresh `session` token.
//! Unknown emails and wrong passwords produce the same `401` response.
//!
//! ## Token storage
//!
//! Only the SHA-256 digest of a token is persisted. The raw value exists in
//! the response (sessions) or the outbound email (reset) and nowhere else.

pub mod api;
pub mod auth;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
