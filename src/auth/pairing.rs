//! Pending platform-link challenges.
//!
//! At most one challenge exists per (platform, pid). Each challenge owns a
//! deadline timer; the timer only removes the entry it was armed for, so a
//! superseding request is never cleared by its predecessor's deadline.
//! Consumption is a single atomic take, so a code can be used at most once
//! even if two bridge messages race.

use super::now_ms;
use crate::network::{Connection, ConnectionId};
use crate::security::secret::generate_pairing_code;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Pairing code and deadline returned to the requesting client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkChallenge {
    pub code: String,
    /// Epoch milliseconds.
    pub expires_at: i64,
}

/// A challenge waiting for its code to show up on the platform.
pub struct PendingChallenge {
    pub platform: String,
    pub pid: String,
    pub code: String,
    /// The connection that asked for the link.
    pub connection: Arc<Connection>,
    deadline: Instant,
    generation: u64,
    cancel: CancellationToken,
}

/// Registry of pending challenges keyed by (platform, pid).
pub struct PairingRegistry {
    entries: DashMap<(String, String), PendingChallenge>,
    next_generation: AtomicU64,
    ttl: Duration,
}

impl PairingRegistry {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            next_generation: AtomicU64::new(1),
            ttl,
        })
    }

    /// Register a challenge for `connection`, replacing any pending one for
    /// the same identity.
    pub fn insert(
        self: &Arc<Self>,
        platform: &str,
        pid: &str,
        connection: Arc<Connection>,
    ) -> LinkChallenge {
        let code = generate_pairing_code();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let deadline = Instant::now() + self.ttl;
        let expires_at = now_ms().saturating_add(i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX));
        let key = (platform.to_string(), pid.to_string());

        let conn_id = connection.id();
        let challenge = PendingChallenge {
            platform: platform.to_string(),
            pid: pid.to_string(),
            code: code.clone(),
            connection,
            deadline,
            generation,
            cancel: cancel.clone(),
        };

        if let Some(previous) = self.entries.insert(key.clone(), challenge) {
            previous.cancel.cancel();
            debug!(platform, pid, "Pending challenge superseded");
        }
        debug!(platform, pid, conn = %conn_id, "Pairing challenge issued");

        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    if let Some(registry) = registry.upgrade() {
                        registry.expire(&key, generation);
                    }
                }
                _ = cancel.cancelled() => {}
            }
        });

        LinkChallenge { code, expires_at }
    }

    /// Atomically remove and return the challenge for (platform, pid) if its
    /// code equals `code` and its deadline has not passed.
    ///
    /// A non-matching code leaves the challenge in place.
    pub fn take(&self, platform: &str, pid: &str, code: &str) -> Option<PendingChallenge> {
        let key = (platform.to_string(), pid.to_string());
        let (_, challenge) = self.entries.remove_if(&key, |_, c| c.code == code)?;
        challenge.cancel.cancel();

        if Instant::now() >= challenge.deadline {
            debug!(platform, pid, "Pairing code matched after deadline");
            return None;
        }
        Some(challenge)
    }

    /// Drop every challenge initiated by `connection_id`. Returns how many
    /// were removed.
    pub fn abandon(&self, connection_id: ConnectionId) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, c| {
            if c.connection.id() == connection_id {
                c.cancel.cancel();
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!(conn = %connection_id, removed, "Abandoned pending challenges");
        }
        removed
    }

    /// Whether a challenge is pending for (platform, pid).
    pub fn contains(&self, platform: &str, pid: &str) -> bool {
        self.entries
            .contains_key(&(platform.to_string(), pid.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn expire(&self, key: &(String, String), generation: u64) {
        if self
            .entries
            .remove_if(key, |_, c| c.generation == generation)
            .is_some()
        {
            debug!(platform = %key.0, pid = %key.1, "Pairing challenge expired");
        }
    }
}
