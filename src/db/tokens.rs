//! Session token repository.
//!
//! Expired rows are never deleted here. Listing filters on `expires_at`,
//! and direct lookups return the row so the caller can tell "expired"
//! apart from "not found".

use super::{DbError, is_unique_violation};
use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt;
use std::str::FromStr;

/// How a session token was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Pairing-code login from an external platform identity.
    Platform,
    /// Name and password.
    Password,
    /// Exchange of a previously issued token.
    Token,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Password => "password",
            Self::Token => "token",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "platform" => Ok(Self::Platform),
            "password" => Ok(Self::Password),
            "token" => Ok(Self::Token),
            other => Err(DbError::UnknownStrategy(other.to_string())),
        }
    }
}

/// A stored session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub serial: i64,
    pub account_id: i64,
    pub strategy: Strategy,
    pub secret: String,
    /// Epoch milliseconds.
    pub expires_at: i64,
    pub created_at: i64,
    pub last_used_at: i64,
    pub user_agent: Option<String>,
    pub address: Option<String>,
}

impl TokenRecord {
    /// Whether the token is past its expiry at `now` (epoch ms).
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Fields for a token insert.
#[derive(Debug, Clone)]
pub struct NewToken<'s> {
    pub account_id: i64,
    pub strategy: Strategy,
    pub secret: &'s str,
    pub expires_at: i64,
    pub created_at: i64,
    pub user_agent: Option<&'s str>,
    pub address: Option<&'s str>,
}

type TokenRow = (
    i64,
    i64,
    String,
    String,
    i64,
    i64,
    i64,
    Option<String>,
    Option<String>,
);

const TOKEN_COLUMNS: &str =
    "id, account_id, strategy, secret, expires_at, created_at, last_used_at, user_agent, address";

fn from_row(row: TokenRow) -> Result<TokenRecord, DbError> {
    let (serial, account_id, strategy, secret, expires_at, created_at, last_used_at, user_agent, address) =
        row;
    Ok(TokenRecord {
        serial,
        account_id,
        strategy: strategy.parse()?,
        secret,
        expires_at,
        created_at,
        last_used_at,
        user_agent,
        address,
    })
}

/// Repository for session token operations.
pub struct TokenRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TokenRepository<'a> {
    /// Create a new token repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a token. A secret that already exists yields
    /// [`DbError::SecretCollision`] from the UNIQUE constraint.
    pub async fn insert(&self, token: &NewToken<'_>) -> Result<TokenRecord, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO tokens (account_id, strategy, secret, expires_at, created_at, last_used_at, user_agent, address)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(token.account_id)
        .bind(token.strategy.as_str())
        .bind(token.secret)
        .bind(token.expires_at)
        .bind(token.created_at)
        .bind(token.created_at)
        .bind(token.user_agent)
        .bind(token.address)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return DbError::SecretCollision;
            }
            DbError::from(e)
        })?;

        Ok(TokenRecord {
            serial: result.last_insert_rowid(),
            account_id: token.account_id,
            strategy: token.strategy,
            secret: token.secret.to_string(),
            expires_at: token.expires_at,
            created_at: token.created_at,
            last_used_at: token.created_at,
            user_agent: token.user_agent.map(String::from),
            address: token.address.map(String::from),
        })
    }

    /// Look up a token by owner and secret, expired or not.
    pub async fn find(&self, account_id: i64, secret: &str) -> Result<Option<TokenRecord>, DbError> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE account_id = ? AND secret = ?"
        ))
        .bind(account_id)
        .bind(secret)
        .fetch_optional(self.pool)
        .await?;

        row.map(from_row).transpose()
    }

    /// Look up a token by serial, expired or not.
    pub async fn find_by_serial(&self, serial: i64) -> Result<Option<TokenRecord>, DbError> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE id = ?"
        ))
        .bind(serial)
        .fetch_optional(self.pool)
        .await?;

        row.map(from_row).transpose()
    }

    /// Unexpired tokens of an account, most recently issued first.
    pub async fn list_active(&self, account_id: i64, now: i64) -> Result<Vec<TokenRecord>, DbError> {
        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE account_id = ? AND expires_at > ? ORDER BY id DESC"
        ))
        .bind(account_id)
        .bind(now)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(from_row).collect()
    }

    /// Record a use of the token.
    pub async fn touch(&self, serial: i64, now: i64) -> Result<(), DbError> {
        sqlx::query("UPDATE tokens SET last_used_at = ? WHERE id = ?")
            .bind(now)
            .bind(serial)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Delete a token by serial. Returns the number of rows removed.
    pub async fn remove(&self, serial: i64) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM tokens WHERE id = ?")
            .bind(serial)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete a token by serial only if it belongs to `account_id`.
    pub async fn remove_owned(&self, serial: i64, account_id: i64) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM tokens WHERE id = ? AND account_id = ?")
            .bind(serial)
            .bind(account_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete a token by secret. Returns the number of rows removed.
    pub async fn remove_by_secret(&self, secret: &str) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM tokens WHERE secret = ?")
            .bind(secret)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
