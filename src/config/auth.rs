//! Session, pairing and admin bootstrap configuration.

use serde::Deserialize;
use std::time::Duration;

use super::defaults;

/// Authentication settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session-token lifetime in seconds (default: one week, minimum: one hour).
    #[serde(default = "defaults::default_token_expire")]
    pub token_expire: u64,
    /// Pairing-challenge lifetime in seconds (default: ten minutes, minimum: one minute).
    #[serde(default = "defaults::default_login_token_expire")]
    pub login_token_expire: u64,
    /// Hash format used when writing new password hashes.
    #[serde(default)]
    pub password_hash: PasswordScheme,
    /// Administrator account created at startup.
    #[serde(default)]
    pub admin: AdminBootstrap,
}

impl AuthConfig {
    /// Session-token lifetime.
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_expire)
    }

    /// Pairing-challenge lifetime.
    pub fn pairing_ttl(&self) -> Duration {
        Duration::from_secs(self.login_token_expire)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_expire: defaults::default_token_expire(),
            login_token_expire: defaults::default_login_token_expire(),
            password_hash: PasswordScheme::default(),
            admin: AdminBootstrap::default(),
        }
    }
}

/// Password hash format for newly written hashes.
///
/// Verification always accepts both formats.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PasswordScheme {
    /// Unsalted SHA-256, lowercase hex.
    #[default]
    Sha256,
    /// Argon2id PHC string.
    Argon2,
}

/// Administrator bootstrap block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminBootstrap {
    /// Create (or refresh) the administrator account at startup.
    #[serde(default)]
    pub enabled: bool,
    /// Administrator account name.
    #[serde(default)]
    pub username: String,
    /// Administrator password (plaintext, hashed before storage).
    #[serde(default)]
    pub password: String,
}
