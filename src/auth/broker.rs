//! Session broker: the only writer of a connection's authenticated state.
//!
//! Every change to what a client should see about its own session goes
//! through [`SessionBroker::set_auth`] or [`SessionBroker::refresh`], which
//! rebuild the [`Snapshot`] from storage and push it.

use super::now_ms;
use crate::db::{Binding, Database, Strategy, TokenRecord};
use crate::error::AuthResult;
use crate::network::protocol::ServerEvent;
use crate::network::{AuthState, Connection};
use serde::Serialize;
use tracing::debug;

/// Authenticated-state payload pushed to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: i64,
    pub name: String,
    pub authority: i64,
    /// The token backing this connection's session.
    pub token: ActiveToken,
    /// Unexpired tokens of the account, most recently issued first.
    pub tokens: Vec<TokenSummary>,
    pub bindings: Vec<BindingSummary>,
}

/// The session's own token. The only place a secret is ever sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveToken {
    pub serial: i64,
    pub strategy: Strategy,
    pub secret: String,
    pub expires_at: i64,
}

/// A token as listed to its owner: no secret, no account id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSummary {
    pub serial: i64,
    pub strategy: Strategy,
    pub expires_at: i64,
    pub created_at: i64,
    pub last_used_at: i64,
    pub user_agent: Option<String>,
    pub address: Option<String>,
}

impl From<TokenRecord> for TokenSummary {
    fn from(token: TokenRecord) -> Self {
        Self {
            serial: token.serial,
            strategy: token.strategy,
            expires_at: token.expires_at,
            created_at: token.created_at,
            last_used_at: token.last_used_at,
            user_agent: token.user_agent,
            address: token.address,
        }
    }
}

/// A binding as listed to its current owner: no owning-account id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingSummary {
    pub platform: String,
    pub pid: String,
    /// Account the identity was first bound to.
    pub bid: i64,
}

impl From<Binding> for BindingSummary {
    fn from(binding: Binding) -> Self {
        Self {
            platform: binding.platform,
            pid: binding.pid,
            bid: binding.bid,
        }
    }
}

/// Builds and pushes session snapshots.
#[derive(Clone)]
pub struct SessionBroker {
    db: Database,
}

impl SessionBroker {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Replace the connection's session and push the new snapshot.
    ///
    /// `None` clears the session and pushes "no session".
    pub async fn set_auth(&self, conn: &Connection, state: Option<AuthState>) -> AuthResult<()> {
        let Some(state) = state else {
            conn.set_auth_state(None);
            conn.send(ServerEvent::Session { body: None }).await;
            debug!(conn = %conn.id(), "Session cleared");
            return Ok(());
        };

        let snapshot = self.snapshot(&state).await?;
        conn.set_auth_state(Some(state));
        conn.send(ServerEvent::Session {
            body: Some(snapshot),
        })
        .await;
        Ok(())
    }

    /// Reload the session's account and push a fresh snapshot.
    ///
    /// Clears the session if the account no longer exists. Nothing is
    /// written if the session was replaced while the snapshot was built.
    pub async fn refresh(&self, conn: &Connection) -> AuthResult<()> {
        let Some(current) = conn.auth() else {
            return Ok(());
        };

        let Some(account) = self.db.accounts().find_by_id(current.account_id).await? else {
            return self.set_auth(conn, None).await;
        };
        let state = current.with_account(&account);
        let snapshot = self.snapshot(&state).await?;

        // A login or logout on the connection may have landed meanwhile.
        if !conn.replace_auth_state_if(current.serial, state) {
            debug!(conn = %conn.id(), serial = current.serial, "Session changed during refresh");
            return Ok(());
        }
        conn.send(ServerEvent::Session {
            body: Some(snapshot),
        })
        .await;
        Ok(())
    }

    /// Assemble the snapshot for `state` from storage.
    pub async fn snapshot(&self, state: &AuthState) -> AuthResult<Snapshot> {
        let tokens = self
            .db
            .tokens()
            .list_active(state.account_id, now_ms())
            .await?;
        let bindings = self.db.bindings().list_for_account(state.account_id).await?;

        Ok(Snapshot {
            id: state.account_id,
            name: state.name.clone(),
            authority: state.authority,
            token: ActiveToken {
                serial: state.serial,
                strategy: state.strategy,
                secret: state.secret.clone(),
                expires_at: state.expires_at,
            },
            tokens: tokens.into_iter().map(TokenSummary::from).collect(),
            bindings: bindings.into_iter().map(BindingSummary::from).collect(),
        })
    }
}
