//! Unified error handling for slauth.
//!
//! Every failure of an exposed operation is an [`AuthError`]. Each one is a
//! terminal outcome for that request: nothing here retries, and the client
//! receives [`AuthError::client_message`] verbatim.

use crate::db::DbError;
use thiserror::Error;

// ============================================================================
// Auth Errors (exposed operations)
// ============================================================================

/// Errors returned by authentication and session operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid name or password")]
    InvalidCredentials,

    #[error("token expired")]
    TokenExpired,

    #[error("token not found")]
    TokenNotFound,

    #[error("account not found")]
    AccountNotFound,

    #[error("identity is already linked to this account")]
    AlreadyLinked,

    #[error("identity is bound to another account")]
    IdentityBound,

    #[error("not logged in")]
    Unauthenticated,

    #[error("binding not found")]
    BindingNotFound,

    #[error("cannot remove the last binding of an account")]
    LastBinding,

    /// Interceptor denial. Deliberately carries no reason.
    #[error("forbidden")]
    Forbidden,

    #[error("name already taken: {0}")]
    NameTaken(String),

    #[error("invalid profile: {0}")]
    InvalidProfile(&'static str),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        Self::PasswordHash(err.to_string())
    }
}

impl AuthError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::TokenExpired => "token_expired",
            Self::TokenNotFound => "token_not_found",
            Self::AccountNotFound => "account_not_found",
            Self::AlreadyLinked => "already_linked",
            Self::IdentityBound => "identity_bound",
            Self::Unauthenticated => "unauthenticated",
            Self::BindingNotFound => "binding_not_found",
            Self::LastBinding => "last_binding",
            Self::Forbidden => "forbidden",
            Self::NameTaken(_) => "name_taken",
            Self::InvalidProfile(_) => "invalid_profile",
            Self::PasswordHash(_) => "password_hash",
            Self::Storage(_) => "storage",
        }
    }

    /// Short human-readable message for the initiating client.
    ///
    /// Storage details stay in the server log.
    pub fn client_message(&self) -> String {
        match self {
            Self::Storage(_) => "storage unavailable, please try again later".to_string(),
            Self::PasswordHash(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether this is a storage-layer failure rather than a user-facing condition.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;
