//! Account repository.
//!
//! Accounts are never hard-deleted here; they are created by the admin
//! bootstrap or by the first successful platform login.

use super::{DbError, is_unique_violation};
use sqlx::SqlitePool;

/// A stored account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub name: String,
    /// Privilege rank, higher permits more operations.
    pub authority: i64,
    pub password_hash: Option<String>,
    pub created_at: i64,
}

type AccountRow = (i64, String, i64, Option<String>, i64);

fn from_row((id, name, authority, password_hash, created_at): AccountRow) -> Account {
    Account {
        id,
        name,
        authority,
        password_hash,
        created_at,
    }
}

/// Repository for account operations.
pub struct AccountRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AccountRepository<'a> {
    /// Create a new account repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an account. The name is unique (case-insensitive).
    pub async fn create(
        &self,
        name: &str,
        authority: i64,
        password_hash: Option<&str>,
    ) -> Result<Account, DbError> {
        let now = chrono::Utc::now().timestamp_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO accounts (name, authority, password_hash, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(authority)
        .bind(password_hash)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return DbError::AccountExists(name.to_string());
            }
            DbError::from(e)
        })?;

        Ok(Account {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            authority,
            password_hash: password_hash.map(String::from),
            created_at: now,
        })
    }

    /// Create an account together with its self-owned binding for
    /// `(platform, pid)`. Both rows are written in one transaction.
    pub async fn create_with_binding(
        &self,
        name: &str,
        authority: i64,
        password_hash: Option<&str>,
        platform: &str,
        pid: &str,
    ) -> Result<Account, DbError> {
        let now = chrono::Utc::now().timestamp_millis();

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO accounts (name, authority, password_hash, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(authority)
        .bind(password_hash)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return DbError::AccountExists(name.to_string());
            }
            DbError::from(e)
        })?;

        let account_id = result.last_insert_rowid();

        sqlx::query(
            r#"
            INSERT INTO bindings (platform, pid, aid, bid)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(platform)
        .bind(pid)
        .bind(account_id)
        .bind(account_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return DbError::BindingExists {
                    platform: platform.to_string(),
                    pid: pid.to_string(),
                };
            }
            DbError::from(e)
        })?;

        tx.commit().await?;

        Ok(Account {
            id: account_id,
            name: name.to_string(),
            authority,
            password_hash: password_hash.map(String::from),
            created_at: now,
        })
    }

    /// Find account by ID.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Account>, DbError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, name, authority, password_hash, created_at
            FROM accounts
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(from_row))
    }

    /// Find account by name (case-insensitive).
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Account>, DbError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, name, authority, password_hash, created_at
            FROM accounts
            WHERE name = ? COLLATE NOCASE
            "#,
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(from_row))
    }

    /// Rename an account.
    pub async fn set_name(&self, id: i64, name: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE accounts SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    return DbError::AccountExists(name.to_string());
                }
                DbError::from(e)
            })?;
        Ok(())
    }

    /// Set or clear the password hash.
    pub async fn set_password_hash(&self, id: i64, hash: Option<&str>) -> Result<(), DbError> {
        sqlx::query("UPDATE accounts SET password_hash = ? WHERE id = ?")
            .bind(hash)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Set the authority level.
    pub async fn set_authority(&self, id: i64, authority: i64) -> Result<(), DbError> {
        sqlx::query("UPDATE accounts SET authority = ? WHERE id = ?")
            .bind(authority)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{Database, DbError};

    #[tokio::test]
    async fn create_and_find() {
        let db = Database::new(":memory:").await.unwrap();
        let created = db.accounts().create("Alice", 3, Some("abc")).await.unwrap();

        let by_id = db.accounts().find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id, created);

        let by_name = db.accounts().find_by_name("alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);
        assert_eq!(by_name.password_hash.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let db = Database::new(":memory:").await.unwrap();
        db.accounts().create("alice", 1, None).await.unwrap();

        let err = db.accounts().create("ALICE", 1, None).await.unwrap_err();
        assert!(matches!(err, DbError::AccountExists(name) if name == "ALICE"));
    }

    #[tokio::test]
    async fn create_with_binding_writes_both_rows() {
        let db = Database::new(":memory:").await.unwrap();
        let acc = db
            .accounts()
            .create_with_binding("dave", 1, None, "qq", "42")
            .await
            .unwrap();

        let binding = db.bindings().find("qq", "42").await.unwrap().unwrap();
        assert_eq!((binding.aid, binding.bid), (acc.id, acc.id));
    }

    #[tokio::test]
    async fn create_with_binding_rolls_back_when_identity_is_bound() {
        let db = Database::new(":memory:").await.unwrap();
        db.accounts()
            .create_with_binding("dave", 1, None, "qq", "42")
            .await
            .unwrap();

        let err = db
            .accounts()
            .create_with_binding("erin", 1, None, "qq", "42")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::BindingExists { ref pid, .. } if pid == "42"));

        // The account insert was rolled back with the binding.
        assert!(db.accounts().find_by_name("erin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_with_binding_rejects_taken_name() {
        let db = Database::new(":memory:").await.unwrap();
        db.accounts().create("dave", 1, None).await.unwrap();

        let err = db
            .accounts()
            .create_with_binding("DAVE", 1, None, "qq", "42")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::AccountExists(_)));
        assert!(db.bindings().find("qq", "42").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rename_collision_is_rejected() {
        let db = Database::new(":memory:").await.unwrap();
        db.accounts().create("alice", 1, None).await.unwrap();
        let bob = db.accounts().create("bob", 1, None).await.unwrap();

        let err = db.accounts().set_name(bob.id, "Alice").await.unwrap_err();
        assert!(matches!(err, DbError::AccountExists(_)));

        db.accounts().set_name(bob.id, "robert").await.unwrap();
        let renamed = db.accounts().find_by_id(bob.id).await.unwrap().unwrap();
        assert_eq!(renamed.name, "robert");
    }

    #[tokio::test]
    async fn update_hash_and_authority() {
        let db = Database::new(":memory:").await.unwrap();
        let acc = db.accounts().create("carol", 1, None).await.unwrap();

        db.accounts().set_password_hash(acc.id, Some("h")).await.unwrap();
        db.accounts().set_authority(acc.id, 4).await.unwrap();

        let acc = db.accounts().find_by_id(acc.id).await.unwrap().unwrap();
        assert_eq!(acc.password_hash.as_deref(), Some("h"));
        assert_eq!(acc.authority, 4);
    }
}
