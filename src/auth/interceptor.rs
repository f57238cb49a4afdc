//! Access interceptor: runs ahead of every request that declares a
//! required authority.
//!
//! Denials are always the same [`AuthError::Forbidden`]; the reason is only
//! visible in the trace log.

use super::{TokenLedger, now_ms};
use crate::error::{AuthError, AuthResult};
use crate::network::Connection;
use tracing::{debug, trace};

/// Authority gate for privileged requests.
#[derive(Clone)]
pub struct AccessInterceptor {
    ledger: TokenLedger,
}

impl AccessInterceptor {
    pub fn new(ledger: TokenLedger) -> Self {
        Self { ledger }
    }

    /// Check `conn` against `required`.
    ///
    /// No requirement always passes. Otherwise the connection needs a
    /// session whose token has not expired and whose account authority is at
    /// least `required`. An expired session is denied but left in place.
    pub async fn check(&self, conn: &Connection, required: Option<i64>) -> AuthResult<()> {
        let Some(required) = required else {
            return Ok(());
        };

        let Some(state) = conn.auth() else {
            Self::log_denial(conn, required, "no session");
            return Err(AuthError::Forbidden);
        };

        if state.is_expired_at(now_ms()) {
            Self::log_denial(conn, required, "token expired");
            return Err(AuthError::Forbidden);
        }

        if state.authority < required {
            Self::log_denial(conn, required, "insufficient authority");
            return Err(AuthError::Forbidden);
        }

        self.ledger.touch(state.serial).await?;
        debug!(
            conn = %conn.id(),
            account_id = state.account_id,
            authority = state.authority,
            required,
            "Access granted"
        );
        Ok(())
    }

    fn log_denial(conn: &Connection, required: i64, reason: &'static str) {
        trace!(conn = %conn.id(), required, reason, "Access denied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ClientInfo;
    use crate::db::{Database, Strategy};
    use crate::network::AuthState;
    use std::time::Duration;

    async fn setup(authority: i64, ttl: Duration) -> (Database, AccessInterceptor, AuthState) {
        let db = Database::new(":memory:").await.unwrap();
        let account = db.accounts().create("alice", authority, None).await.unwrap();
        let ledger = TokenLedger::new(db.clone(), ttl);
        let token = ledger
            .issue(&account, Strategy::Password, &ClientInfo::default())
            .await
            .unwrap();
        let state = AuthState::new(&account, &token);
        (db, AccessInterceptor::new(ledger), state)
    }

    #[tokio::test]
    async fn unrestricted_requests_always_pass() {
        let (_db, interceptor, _state) = setup(1, Duration::from_secs(3600)).await;
        let (conn, _rx) = Connection::channel(4, None, None);
        interceptor.check(&conn, None).await.unwrap();
    }

    #[tokio::test]
    async fn missing_session_is_denied() {
        let (_db, interceptor, _state) = setup(1, Duration::from_secs(3600)).await;
        let (conn, _rx) = Connection::channel(4, None, None);
        assert!(matches!(
            interceptor.check(&conn, Some(1)).await,
            Err(AuthError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn authority_threshold() {
        let (_db, interceptor, state) = setup(3, Duration::from_secs(3600)).await;
        let (conn, _rx) = Connection::channel(4, None, None);
        conn.set_auth_state(Some(state));

        interceptor.check(&conn, Some(3)).await.unwrap();
        interceptor.check(&conn, Some(1)).await.unwrap();
        assert!(matches!(
            interceptor.check(&conn, Some(4)).await,
            Err(AuthError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn expired_session_is_denied_but_kept() {
        let (_db, interceptor, state) = setup(5, Duration::from_millis(20)).await;
        let (conn, _rx) = Connection::channel(4, None, None);
        conn.set_auth_state(Some(state));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(matches!(
            interceptor.check(&conn, Some(1)).await,
            Err(AuthError::Forbidden)
        ));
        assert!(conn.auth().is_some());
    }

    #[tokio::test]
    async fn grant_marks_token_used() {
        let (db, interceptor, state) = setup(1, Duration::from_secs(3600)).await;
        let serial = state.serial;
        let (conn, _rx) = Connection::channel(4, None, None);
        conn.set_auth_state(Some(state));

        let before = db.tokens().find_by_serial(serial).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        interceptor.check(&conn, Some(1)).await.unwrap();

        let after = db.tokens().find_by_serial(serial).await.unwrap().unwrap();
        assert!(after.last_used_at > before.last_used_at);
    }
}
