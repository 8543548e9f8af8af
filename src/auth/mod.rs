//! Password reset and session token core.
//!
//! Services depend only on the traits in [`store`], [`credentials`],
//! [`notifier`] and [`clock`]; [`postgres`] and [`memory`] provide the
//! storage implementations.
//!
//! ## Reset token lifecycle
//!
//! A `forgotpassword` token is issued on request and is either consumed by a
//! successful reset within its TTL (2 hours by default, inclusive) or expires.
//! Both outcomes are terminal. Consumption removes the token and writes the new
//! password hash as one unit, so a token can be redeemed at most once even
//! under concurrent requests.

pub mod clock;
pub mod credentials;
pub mod error;
pub mod memory;
pub mod models;
pub mod notifier;
pub mod postgres;
pub mod reset;
pub mod session;
pub mod store;
pub mod utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{Argon2Verifier, CredentialVerifier};
pub use error::AuthError;
pub use memory::MemoryStore;
pub use models::{Token, TokenKind, User};
pub use notifier::{LogNotifier, MemoryNotifier, Notifier, OutboxNotifier, ResetNotice};
pub use postgres::PgStore;
pub use reset::{PasswordResetService, DEFAULT_RESET_TOKEN_TTL_SECONDS};
pub use session::SessionService;
pub use store::{TokenStore, UserStore};
