//! Auth handlers and supporting modules.
//!
//! `/forgot` and `/reset` drive the password reset flow, `/sessions` issues
//! session tokens. Handlers only translate between JSON and the services in
//! [`crate::auth`]; every decision about tokens lives there.
//!
//! Token failures on `/reset` (unknown, expired, wrong kind, already used)
//! all answer `400 Invalid token`.

pub(crate) mod password;
pub(crate) mod session;
mod state;
pub(crate) mod types;
mod utils;

pub use state::{AuthConfig, AuthState};

#[cfg(test)]
mod tests;
