//! Binding reconciler: every mutation of the bindings table.
//!
//! An account that holds bindings keeps at least one self-owned binding
//! (`aid == bid`). Unbinding a claimed identity hands it back to its
//! original account instead of deleting it.
//!
//! Mutations run under one async lock so concurrent requests for the same
//! account cannot each see "two left" and both remove one.

use super::DEFAULT_AUTHORITY;
use crate::db::{Account, Binding, Database, DbError};
use crate::error::{AuthError, AuthResult};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// What [`BindingReconciler::bind`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// No binding existed; a self-owned one was created.
    Created,
    /// The identity moved from account `from`.
    Claimed { from: i64 },
}

/// What [`BindingReconciler::unbind`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnbindOutcome {
    /// A self-owned binding was deleted.
    Removed,
    /// A claimed binding went back to its original account.
    Restored { to: i64 },
}

#[derive(Clone)]
pub struct BindingReconciler {
    db: Database,
    lock: Arc<Mutex<()>>,
}

impl BindingReconciler {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Attach (platform, pid) to `account_id`.
    pub async fn bind(&self, account_id: i64, platform: &str, pid: &str) -> AuthResult<BindOutcome> {
        let _guard = self.lock.lock().await;
        let bindings = self.db.bindings();

        match bindings.find(platform, pid).await? {
            Some(existing) if existing.aid == account_id => Err(AuthError::AlreadyLinked),
            Some(existing) => {
                bindings.set_aid(platform, pid, account_id).await?;
                info!(account_id, platform, pid, from = existing.aid, "Binding claimed");
                Ok(BindOutcome::Claimed { from: existing.aid })
            }
            None => {
                bindings
                    .create(&Binding {
                        platform: platform.to_string(),
                        pid: pid.to_string(),
                        aid: account_id,
                        bid: account_id,
                    })
                    .await?;
                info!(account_id, platform, pid, "Binding created");
                Ok(BindOutcome::Created)
            }
        }
    }

    /// Detach (platform, pid) from `account_id`.
    pub async fn unbind(
        &self,
        account_id: i64,
        platform: &str,
        pid: &str,
    ) -> AuthResult<UnbindOutcome> {
        let _guard = self.lock.lock().await;
        let bindings = self.db.bindings();

        let owned = bindings.list_for_account(account_id).await?;
        let target = owned
            .iter()
            .find(|b| b.platform == platform && b.pid == pid)
            .ok_or(AuthError::BindingNotFound)?;

        if !target.is_self_owned() {
            bindings.set_aid(platform, pid, target.bid).await?;
            info!(account_id, platform, pid, to = target.bid, "Binding restored to original account");
            return Ok(UnbindOutcome::Restored { to: target.bid });
        }

        let self_owned = owned.iter().filter(|b| b.is_self_owned()).count();
        if self_owned <= 1 {
            return Err(AuthError::LastBinding);
        }

        bindings.remove(platform, pid).await?;
        info!(account_id, platform, pid, "Binding removed");
        Ok(UnbindOutcome::Removed)
    }

    /// Account currently owning (platform, pid), creating both the account
    /// and a self-owned binding on first sight of the identity.
    ///
    /// New accounts take `display_name` when it is free, else
    /// `platform:pid`.
    pub async fn resolve_or_create(
        &self,
        platform: &str,
        pid: &str,
        display_name: Option<&str>,
    ) -> AuthResult<Account> {
        let _guard = self.lock.lock().await;

        if let Some(binding) = self.db.bindings().find(platform, pid).await? {
            return self
                .db
                .accounts()
                .find_by_id(binding.aid)
                .await?
                .ok_or(AuthError::AccountNotFound);
        }

        let fallback = format!("{platform}:{pid}");
        let preferred = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&fallback);

        let accounts = self.db.accounts();
        let account = match accounts
            .create_with_binding(preferred, DEFAULT_AUTHORITY, None, platform, pid)
            .await
        {
            Ok(account) => account,
            Err(DbError::AccountExists(_)) if preferred != fallback => accounts
                .create_with_binding(&fallback, DEFAULT_AUTHORITY, None, platform, pid)
                .await
                .map_err(|e| match e {
                    DbError::AccountExists(name) => AuthError::NameTaken(name),
                    other => other.into(),
                })?,
            Err(DbError::AccountExists(name)) => return Err(AuthError::NameTaken(name)),
            Err(e) => return Err(e.into()),
        };

        info!(account_id = account.id, platform, pid, name = %account.name, "Account created from platform identity");
        Ok(account)
    }

    /// Make sure (platform, pid) originates from `account_id`, creating a
    /// self-owned binding if the identity is unbound.
    ///
    /// An identity that originates from another account is an error; the
    /// caller would otherwise be left without a binding.
    pub async fn ensure_self_binding(
        &self,
        account_id: i64,
        platform: &str,
        pid: &str,
    ) -> AuthResult<()> {
        let _guard = self.lock.lock().await;
        let bindings = self.db.bindings();

        match bindings.find(platform, pid).await? {
            Some(existing) if existing.bid == account_id => Ok(()),
            Some(existing) => {
                warn!(account_id, platform, pid, bid = existing.bid, "Identity originates from another account");
                Err(AuthError::IdentityBound)
            }
            None => {
                bindings
                    .create(&Binding {
                        platform: platform.to_string(),
                        pid: pid.to_string(),
                        aid: account_id,
                        bid: account_id,
                    })
                    .await?;
                info!(account_id, platform, pid, "Binding created");
                Ok(())
            }
        }
    }
}
