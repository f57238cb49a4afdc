//! Per-client connection state.
//!
//! A `Connection` is shared (`Arc`) between its socket task, the pairing
//! registry (while a challenge it initiated is pending) and whatever handler
//! is currently running for it. Outbound events go through a bounded queue
//! drained by the socket writer.

use crate::auth::ClientInfo;
use crate::db::{Account, Strategy, TokenRecord};
use crate::network::protocol::ServerEvent;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Connection identifier.
pub type ConnectionId = Uuid;

/// Timeout for queueing an event to a slow consumer before giving up.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Authenticated state stored on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub account_id: i64,
    pub name: String,
    pub authority: i64,
    /// Serial of the session token backing this state.
    pub serial: i64,
    pub strategy: Strategy,
    pub secret: String,
    /// Epoch milliseconds.
    pub expires_at: i64,
}

impl AuthState {
    pub fn new(account: &Account, token: &TokenRecord) -> Self {
        Self {
            account_id: account.id,
            name: account.name.clone(),
            authority: account.authority,
            serial: token.serial,
            strategy: token.strategy,
            secret: token.secret.clone(),
            expires_at: token.expires_at,
        }
    }

    /// Same token, account fields reloaded.
    pub fn with_account(&self, account: &Account) -> Self {
        Self {
            account_id: account.id,
            name: account.name.clone(),
            authority: account.authority,
            ..self.clone()
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// A connected client.
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<Arc<ServerEvent>>,
    user_agent: Option<String>,
    remote_addr: Option<SocketAddr>,
    auth: RwLock<Option<AuthState>>,
}

impl Connection {
    /// Create a connection around an existing outbound queue.
    pub fn new(
        tx: mpsc::Sender<Arc<ServerEvent>>,
        user_agent: Option<String>,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            user_agent,
            remote_addr,
            auth: RwLock::new(None),
        }
    }

    /// Create a connection together with the receiving end of its queue.
    pub fn channel(
        capacity: usize,
        user_agent: Option<String>,
        remote_addr: Option<SocketAddr>,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<ServerEvent>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self::new(tx, user_agent, remote_addr)), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Request metadata recorded on issued tokens.
    pub fn client_info(&self) -> ClientInfo {
        ClientInfo {
            user_agent: self.user_agent().map(String::from),
            address: self.remote_addr().map(|a| a.ip().to_string()),
        }
    }

    /// Current authenticated state, if any.
    pub fn auth(&self) -> Option<AuthState> {
        self.auth.read().clone()
    }

    /// Replace the auth slot. Only the session broker writes here.
    pub(crate) fn set_auth_state(&self, state: Option<AuthState>) {
        *self.auth.write() = state;
    }

    /// Replace the auth slot only while it still holds the token `serial`.
    pub(crate) fn replace_auth_state_if(&self, serial: i64, state: AuthState) -> bool {
        let mut slot = self.auth.write();
        if slot.as_ref().is_some_and(|current| current.serial == serial) {
            *slot = Some(state);
            true
        } else {
            false
        }
    }

    /// Queue an event for the client.
    ///
    /// Returns `false` if the connection is gone or the queue stayed full
    /// past the send timeout.
    pub async fn send(&self, event: ServerEvent) -> bool {
        match tokio::time::timeout(SEND_TIMEOUT, self.tx.send(Arc::new(event))).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => false,
            Err(_timeout) => {
                tracing::warn!(conn = %self.id, "Outbound queue full: client not reading");
                false
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("account", &self.auth.read().as_ref().map(|a| a.account_id))
            .finish()
    }
}
