//! Binding repository.
//!
//! A binding ties a `(platform, pid)` external identity to an account.
//! `aid` is the current owner, `bid` the account the identity originally
//! belonged to. A binding with `aid == bid` is self-owned.

use super::DbError;
use sqlx::SqlitePool;

/// A stored external-identity binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub platform: String,
    pub pid: String,
    pub aid: i64,
    pub bid: i64,
}

impl Binding {
    /// Whether the binding is owned by the account it originally belonged to.
    pub fn is_self_owned(&self) -> bool {
        self.aid == self.bid
    }
}

type BindingRow = (String, String, i64, i64);

fn from_row((platform, pid, aid, bid): BindingRow) -> Binding {
    Binding {
        platform,
        pid,
        aid,
        bid,
    }
}

/// Repository for binding operations.
pub struct BindingRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BindingRepository<'a> {
    /// Create a new binding repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Find the binding for an external identity.
    pub async fn find(&self, platform: &str, pid: &str) -> Result<Option<Binding>, DbError> {
        let row = sqlx::query_as::<_, BindingRow>(
            r#"
            SELECT platform, pid, aid, bid
            FROM bindings
            WHERE platform = ? AND pid = ?
            "#,
        )
        .bind(platform)
        .bind(pid)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(from_row))
    }

    /// All bindings currently owned by an account.
    pub async fn list_for_account(&self, aid: i64) -> Result<Vec<Binding>, DbError> {
        let rows = sqlx::query_as::<_, BindingRow>(
            r#"
            SELECT platform, pid, aid, bid
            FROM bindings
            WHERE aid = ?
            ORDER BY platform, pid
            "#,
        )
        .bind(aid)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(from_row).collect())
    }

    /// Insert a new binding. Fails if the identity is already bound.
    pub async fn create(&self, binding: &Binding) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO bindings (platform, pid, aid, bid)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&binding.platform)
        .bind(&binding.pid)
        .bind(binding.aid)
        .bind(binding.bid)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Re-point a binding to a different current owner.
    pub async fn set_aid(&self, platform: &str, pid: &str, aid: i64) -> Result<(), DbError> {
        sqlx::query("UPDATE bindings SET aid = ? WHERE platform = ? AND pid = ?")
            .bind(aid)
            .bind(platform)
            .bind(pid)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Delete a binding. Returns the number of rows removed.
    pub async fn remove(&self, platform: &str, pid: &str) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM bindings WHERE platform = ? AND pid = ?")
            .bind(platform)
            .bind(pid)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
