//! Account email handling shared by the reset and session flows.

use regex::Regex;
use std::sync::OnceLock;

static ADDRESS: OnceLock<Option<Regex>> = OnceLock::new();

/// Canonical form used to look accounts up: trimmed and lowercased.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Lookup key for a reset request, or `None` when the input cannot name an
/// account (`local@domain.tld`, no whitespace).
#[must_use]
pub fn reset_lookup_key(raw: &str) -> Option<String> {
    let email = normalize_email(raw);
    let address = ADDRESS.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());
    address
        .as_ref()
        .is_some_and(|regex| regex.is_match(&email))
        .then_some(email)
}
