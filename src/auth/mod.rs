//! Authentication and session management.
//!
//! - [`TokenLedger`]: session token issue/validate/revoke
//! - [`PairingRegistry`]: pending platform-link challenges
//! - [`SessionBroker`]: per-connection session state and snapshot pushes
//! - [`AccessInterceptor`]: authority gate ahead of privileged requests
//! - [`BindingReconciler`]: platform identity bindings
//! - [`AuthService`]: the exposed operations, wiring the above together

mod broker;
mod interceptor;
mod ledger;
mod pairing;
mod reconciler;
mod service;

pub use broker::{ActiveToken, BindingSummary, SessionBroker, Snapshot, TokenSummary};
pub use interceptor::AccessInterceptor;
pub use ledger::{ClientInfo, TokenLedger};
pub use pairing::{LinkChallenge, PairingRegistry, PendingChallenge};
pub use reconciler::{BindOutcome, BindingReconciler, UnbindOutcome};
pub use service::AuthService;

/// Authority of accounts created from a platform identity.
pub const DEFAULT_AUTHORITY: i64 = 1;

/// Authority required to relay platform messages.
pub const BRIDGE_AUTHORITY: i64 = 4;

/// Authority of the bootstrapped admin account.
pub const ADMIN_AUTHORITY: i64 = 5;

/// Pseudo-platform holding the admin account's own binding.
pub const LOCAL_PLATFORM: &str = "local";

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
