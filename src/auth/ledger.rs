//! Token ledger: issue, validate and revoke session tokens.
//!
//! A token is the pair (account id, secret). The serial is the row id and
//! is only used to address a token for revocation and in snapshots.

use super::now_ms;
use crate::db::{Account, Database, DbError, NewToken, Strategy, TokenRecord};
use crate::error::{AuthError, AuthResult};
use crate::security::secret::generate_secret;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fresh secrets before giving up on a UNIQUE collision.
const MAX_ISSUE_ATTEMPTS: usize = 3;

/// Request metadata recorded on issued tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub address: Option<String>,
}

/// Issues and checks session tokens.
#[derive(Clone)]
pub struct TokenLedger {
    db: Database,
    ttl: Duration,
}

impl TokenLedger {
    pub fn new(db: Database, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    /// Issue a fresh token for `account`.
    pub async fn issue(
        &self,
        account: &Account,
        strategy: Strategy,
        client: &ClientInfo,
    ) -> AuthResult<TokenRecord> {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);

        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let now = now_ms();
            let secret = generate_secret();
            let token = NewToken {
                account_id: account.id,
                strategy,
                secret: &secret,
                expires_at: now.saturating_add(ttl_ms),
                created_at: now,
                user_agent: client.user_agent.as_deref(),
                address: client.address.as_deref(),
            };

            match self.db.tokens().insert(&token).await {
                Ok(record) => {
                    info!(
                        account_id = account.id,
                        serial = record.serial,
                        strategy = %strategy,
                        "Token issued"
                    );
                    return Ok(record);
                }
                Err(DbError::SecretCollision) => {
                    warn!(account_id = account.id, attempt, "Token secret collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DbError::SecretCollision.into())
    }

    /// Check a presented (account id, secret) pair and return its account.
    ///
    /// Marks the token as used on success.
    pub async fn validate(&self, account_id: i64, secret: &str) -> AuthResult<Account> {
        let token = self
            .db
            .tokens()
            .find(account_id, secret)
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        let now = now_ms();
        if token.is_expired_at(now) {
            debug!(account_id, serial = token.serial, "Presented token has expired");
            return Err(AuthError::TokenExpired);
        }

        let account = self
            .db
            .accounts()
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        self.db.tokens().touch(token.serial, now).await?;
        Ok(account)
    }

    /// Record use of a token.
    pub async fn touch(&self, serial: i64) -> AuthResult<()> {
        self.db.tokens().touch(serial, now_ms()).await?;
        Ok(())
    }

    /// Delete a token by serial. Deleting an absent token is a no-op.
    pub async fn revoke(&self, serial: i64) -> AuthResult<bool> {
        let removed = self.db.tokens().remove(serial).await? > 0;
        if removed {
            info!(serial, "Token revoked");
        }
        Ok(removed)
    }

    /// Delete a token by serial only if `account_id` owns it.
    pub async fn revoke_owned(&self, account_id: i64, serial: i64) -> AuthResult<bool> {
        let removed = self.db.tokens().remove_owned(serial, account_id).await? > 0;
        if removed {
            info!(account_id, serial, "Token revoked");
        }
        Ok(removed)
    }

    /// Delete the token carrying `secret`, if any.
    pub async fn revoke_by_secret(&self, secret: &str) -> AuthResult<bool> {
        Ok(self.db.tokens().remove_by_secret(secret).await? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    async fn setup(ttl: Duration) -> (Database, TokenLedger, Account) {
        let db = Database::new(":memory:").await.unwrap();
        let account = db.accounts().create("alice", 1, None).await.unwrap();
        let ledger = TokenLedger::new(db.clone(), ttl);
        (db, ledger, account)
    }

    #[tokio::test]
    async fn issue_sets_lifetime_and_metadata() {
        let (_db, ledger, account) = setup(Duration::from_secs(3600)).await;
        let client = ClientInfo {
            user_agent: Some("test-agent".into()),
            address: Some("127.0.0.1".into()),
        };

        let before = now_ms();
        let token = ledger.issue(&account, Strategy::Password, &client).await.unwrap();

        assert_eq!(token.account_id, account.id);
        assert_eq!(token.strategy, Strategy::Password);
        assert_eq!(token.secret.len(), crate::security::secret::SECRET_LEN);
        assert!(token.created_at >= before);
        assert_eq!(token.expires_at - token.created_at, 3_600_000);
        assert_eq!(token.last_used_at, token.created_at);
        assert_eq!(token.user_agent.as_deref(), Some("test-agent"));
        assert_eq!(token.address.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn validate_accepts_live_token() {
        let (db, ledger, account) = setup(Duration::from_secs(3600)).await;
        let token = ledger
            .issue(&account, Strategy::Password, &ClientInfo::default())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let found = ledger.validate(account.id, &token.secret).await.unwrap();
        assert_eq!(found.id, account.id);

        let stored = db.tokens().find_by_serial(token.serial).await.unwrap().unwrap();
        assert!(stored.last_used_at > token.last_used_at);
    }

    #[tokio::test]
    async fn validate_rejects_wrong_pair() {
        let (db, ledger, account) = setup(Duration::from_secs(3600)).await;
        let other = db.accounts().create("bob", 1, None).await.unwrap();
        let token = ledger
            .issue(&account, Strategy::Password, &ClientInfo::default())
            .await
            .unwrap();

        // Secret is valid, account id is not its owner
        assert!(matches!(
            ledger.validate(other.id, &token.secret).await,
            Err(AuthError::TokenNotFound)
        ));
        assert!(matches!(
            ledger.validate(account.id, "not-a-secret").await,
            Err(AuthError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn validate_rejects_expired_token() {
        let (_db, ledger, account) = setup(Duration::from_millis(20)).await;
        let token = ledger
            .issue(&account, Strategy::Token, &ClientInfo::default())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(matches!(
            ledger.validate(account.id, &token.secret).await,
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let (_db, ledger, account) = setup(Duration::from_secs(3600)).await;
        let token = ledger
            .issue(&account, Strategy::Password, &ClientInfo::default())
            .await
            .unwrap();

        assert!(ledger.revoke(token.serial).await.unwrap());
        assert!(!ledger.revoke(token.serial).await.unwrap());
        assert!(matches!(
            ledger.validate(account.id, &token.secret).await,
            Err(AuthError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn revoke_owned_ignores_foreign_tokens() {
        let (db, ledger, account) = setup(Duration::from_secs(3600)).await;
        let other = db.accounts().create("bob", 1, None).await.unwrap();
        let token = ledger
            .issue(&account, Strategy::Password, &ClientInfo::default())
            .await
            .unwrap();

        assert!(!ledger.revoke_owned(other.id, token.serial).await.unwrap());
        assert!(ledger.revoke_owned(account.id, token.serial).await.unwrap());
    }

    #[tokio::test]
    async fn issued_secrets_are_unique() {
        let (_db, ledger, account) = setup(Duration::from_secs(3600)).await;
        let client = ClientInfo::default();

        let mut secrets = HashSet::new();
        for _ in 0..10_000 {
            let token = ledger.issue(&account, Strategy::Token, &client).await.unwrap();
            assert!(secrets.insert(token.secret));
        }
        assert_eq!(secrets.len(), 10_000);
    }
}
