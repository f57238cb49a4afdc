//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

// =============================================================================
// Database Defaults
// =============================================================================

pub fn default_database_path() -> String {
    "slauth.db".to_string()
}

// =============================================================================
// Auth Defaults
// =============================================================================

/// One week.
pub fn default_token_expire() -> u64 {
    7 * 24 * 3600
}

/// Ten minutes.
pub fn default_login_token_expire() -> u64 {
    600
}

/// Lower bound for `auth.token_expire` (one hour).
pub const MIN_TOKEN_EXPIRE: u64 = 3600;

/// Lower bound for `auth.login_token_expire` (one minute).
pub const MIN_LOGIN_TOKEN_EXPIRE: u64 = 60;
