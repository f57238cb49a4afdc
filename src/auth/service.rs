//! The exposed authentication operations.
//!
//! Each operation acts on behalf of one connection and either fails with an
//! [`AuthError`] or leaves the connection with a freshly pushed snapshot.

use super::{
    ADMIN_AUTHORITY, AccessInterceptor, BindingReconciler, LOCAL_PLATFORM, LinkChallenge,
    PairingRegistry, SessionBroker, TokenLedger,
};
use crate::config::AuthConfig;
use crate::db::{Account, Database, DbError, Strategy};
use crate::error::{AuthError, AuthResult};
use crate::network::protocol::{InboundMessage, ProfilePatch, ServerEvent};
use crate::network::{AuthState, Connection};
use crate::security::password::{hash_password, verify_password};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Authentication service shared by every connection.
pub struct AuthService {
    db: Database,
    config: AuthConfig,
    ledger: TokenLedger,
    pairing: Arc<PairingRegistry>,
    broker: SessionBroker,
    interceptor: AccessInterceptor,
    reconciler: BindingReconciler,
}

impl AuthService {
    pub fn new(db: Database, config: AuthConfig) -> Self {
        let token_ttl = config.token_ttl();
        let pairing_ttl = config.pairing_ttl();
        Self::with_lifetimes(db, config, token_ttl, pairing_ttl)
    }

    /// Build with explicit token and pairing lifetimes instead of the
    /// configured ones.
    pub fn with_lifetimes(
        db: Database,
        config: AuthConfig,
        token_ttl: Duration,
        pairing_ttl: Duration,
    ) -> Self {
        let ledger = TokenLedger::new(db.clone(), token_ttl);
        Self {
            pairing: PairingRegistry::new(pairing_ttl),
            broker: SessionBroker::new(db.clone()),
            interceptor: AccessInterceptor::new(ledger.clone()),
            reconciler: BindingReconciler::new(db.clone()),
            ledger,
            config,
            db,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn pairing(&self) -> &Arc<PairingRegistry> {
        &self.pairing
    }

    /// Create or refresh the configured admin account.
    ///
    /// Returns `None` when bootstrap is disabled.
    pub async fn bootstrap_admin(&self) -> AuthResult<Option<Account>> {
        let admin = &self.config.admin;
        if !admin.enabled {
            return Ok(None);
        }

        let hash = hash_password(&admin.password, self.config.password_hash)?;
        let accounts = self.db.accounts();

        // The local binding outlives renames, so it identifies the admin
        // before the configured name does.
        let existing = match self.db.bindings().find(LOCAL_PLATFORM, &admin.username).await? {
            Some(binding) => Some(
                accounts
                    .find_by_id(binding.bid)
                    .await?
                    .ok_or(AuthError::AccountNotFound)?,
            ),
            None => accounts.find_by_name(&admin.username).await?,
        };

        let account_id = match existing {
            Some(existing) => {
                self.reconciler
                    .ensure_self_binding(existing.id, LOCAL_PLATFORM, &admin.username)
                    .await?;
                accounts.set_password_hash(existing.id, Some(&hash)).await?;
                if existing.authority < ADMIN_AUTHORITY {
                    accounts.set_authority(existing.id, ADMIN_AUTHORITY).await?;
                }
                info!(account_id = existing.id, name = %existing.name, "Admin account refreshed");
                existing.id
            }
            None => {
                let created = accounts
                    .create_with_binding(
                        &admin.username,
                        ADMIN_AUTHORITY,
                        Some(&hash),
                        LOCAL_PLATFORM,
                        &admin.username,
                    )
                    .await?;
                info!(account_id = created.id, name = %created.name, "Admin account created");
                created.id
            }
        };

        Ok(accounts.find_by_id(account_id).await?)
    }

    /// Push the initial "no session" state to a new connection.
    pub async fn connection_opened(&self, conn: &Connection) -> AuthResult<()> {
        self.broker.set_auth(conn, None).await
    }

    /// Drop every pending challenge the connection initiated.
    pub fn connection_closed(&self, conn: &Connection) {
        self.pairing.abandon(conn.id());
    }

    /// Run the access interceptor for a request requiring `required`.
    pub async fn authorize(&self, conn: &Connection, required: Option<i64>) -> AuthResult<()> {
        self.interceptor.check(conn, required).await
    }

    pub async fn login_with_password(
        &self,
        conn: &Connection,
        name: &str,
        password: &str,
    ) -> AuthResult<()> {
        let account = self
            .db
            .accounts()
            .find_by_name(name)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let verified = account
            .password_hash
            .as_deref()
            .is_some_and(|stored| verify_password(password, stored));
        if !verified {
            debug!(account_id = account.id, "Password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        self.start_session(conn, &account, Strategy::Password).await
    }

    /// Exchange a previously issued token for a new one. The presented token
    /// stays valid.
    pub async fn login_with_token(
        &self,
        conn: &Connection,
        account_id: i64,
        secret: &str,
    ) -> AuthResult<()> {
        let account = self.ledger.validate(account_id, secret).await?;
        self.start_session(conn, &account, Strategy::Token).await
    }

    /// Open a pairing challenge for (platform, pid) on behalf of `conn`.
    ///
    /// The returned code is delivered out of band; the link completes when
    /// the same identity sends it through a bridge.
    pub async fn request_platform_link(
        &self,
        conn: &Arc<Connection>,
        platform: &str,
        pid: &str,
    ) -> AuthResult<LinkChallenge> {
        if let Some(state) = conn.auth()
            && let Some(binding) = self.db.bindings().find(platform, pid).await?
            && binding.aid == state.account_id
        {
            return Err(AuthError::AlreadyLinked);
        }

        let challenge = self.pairing.insert(platform, pid, Arc::clone(conn));
        info!(conn = %conn.id(), platform, pid, "Platform link requested");
        Ok(challenge)
    }

    /// Match an inbound platform message against pending challenges.
    ///
    /// Returns `true` if the message consumed a challenge, whether or not
    /// completing the link then succeeded. Failures are reported to the
    /// connection that asked for the link.
    pub async fn route_platform_message(&self, message: &InboundMessage) -> bool {
        let code = message.content.trim();
        if code.is_empty() {
            return false;
        }

        let Some(challenge) = self.pairing.take(&message.platform, &message.pid, code) else {
            return false;
        };

        let conn = &challenge.connection;
        if let Err(e) = self
            .complete_link(conn, &challenge.platform, &challenge.pid, message.name.as_deref())
            .await
        {
            warn!(
                conn = %conn.id(),
                platform = %challenge.platform,
                pid = %challenge.pid,
                error = %e,
                code = e.error_code(),
                "Platform link failed"
            );
            conn.send(ServerEvent::error(e.client_message())).await;
        }
        true
    }

    async fn complete_link(
        &self,
        conn: &Connection,
        platform: &str,
        pid: &str,
        display_name: Option<&str>,
    ) -> AuthResult<()> {
        match conn.auth() {
            Some(state) => {
                self.reconciler.bind(state.account_id, platform, pid).await?;
                self.broker.refresh(conn).await
            }
            None => {
                let account = self
                    .reconciler
                    .resolve_or_create(platform, pid, display_name)
                    .await?;
                self.start_session(conn, &account, Strategy::Platform).await
            }
        }
    }

    /// Revoke one of the session account's tokens by serial.
    pub async fn delete_token(&self, conn: &Connection, serial: i64) -> AuthResult<()> {
        let state = require_session(conn)?;
        self.ledger.revoke_owned(state.account_id, serial).await?;

        if serial == state.serial {
            self.broker.set_auth(conn, None).await
        } else {
            self.broker.refresh(conn).await
        }
    }

    pub async fn unbind(&self, conn: &Connection, platform: &str, pid: &str) -> AuthResult<()> {
        let state = require_session(conn)?;
        self.reconciler.unbind(state.account_id, platform, pid).await?;
        self.broker.refresh(conn).await
    }

    /// Apply a partial update to the session's account.
    ///
    /// The whole patch is validated before anything is written.
    pub async fn update_profile(&self, conn: &Connection, patch: &ProfilePatch) -> AuthResult<()> {
        let state = require_session(conn)?;

        let name = match patch.name.as_deref().map(str::trim) {
            Some("") => return Err(AuthError::InvalidProfile("name must not be empty")),
            other => other,
        };
        let hash = match patch.password.as_deref() {
            Some("") => return Err(AuthError::InvalidProfile("password must not be empty")),
            Some(password) => Some(hash_password(password, self.config.password_hash)?),
            None => None,
        };

        let accounts = self.db.accounts();
        if let Some(name) = name
            && name != state.name
        {
            accounts
                .set_name(state.account_id, name)
                .await
                .map_err(|e| match e {
                    DbError::AccountExists(name) => AuthError::NameTaken(name),
                    other => other.into(),
                })?;
        }
        if let Some(hash) = hash {
            accounts
                .set_password_hash(state.account_id, Some(&hash))
                .await?;
        }

        info!(account_id = state.account_id, "Profile updated");
        self.broker.refresh(conn).await
    }

    /// Revoke the session's token and clear the session.
    pub async fn logout(&self, conn: &Connection) -> AuthResult<()> {
        if let Some(state) = conn.auth() {
            self.ledger.revoke_by_secret(&state.secret).await?;
            info!(account_id = state.account_id, serial = state.serial, "Logged out");
        }
        self.broker.set_auth(conn, None).await
    }

    async fn start_session(
        &self,
        conn: &Connection,
        account: &Account,
        strategy: Strategy,
    ) -> AuthResult<()> {
        let token = self
            .ledger
            .issue(account, strategy, &conn.client_info())
            .await?;
        info!(
            conn = %conn.id(),
            account_id = account.id,
            strategy = %strategy,
            "Login succeeded"
        );
        self.broker
            .set_auth(conn, Some(AuthState::new(account, &token)))
            .await
    }
}

fn require_session(conn: &Connection) -> AuthResult<AuthState> {
    conn.auth().ok_or(AuthError::Unauthenticated)
}
