//! Subscriber registry and fanout for realtime connections.
//!
//! Three addressing topologies share one registry:
//!
//! ```text
//! Single   key ──▶ conn            (latest subscribe wins)
//! Grouped  key ──▶ {conn, conn}    (key removed when emptied)
//! Set            ──▶ {conn, conn}  (no key)
//! ```
//!
//! Every mutation takes the registry write lock, so subscribe, unsubscribe
//! and deregister are atomic with respect to each other. Broadcasts clone
//! the target list under the read lock and send after releasing it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::foundation::ConnectionId;
use crate::domain::realtime::{ProgressEvent, Topology};
use crate::ports::{ProgressPublisher, RealtimeConnection};

type Connection = Arc<dyn RealtimeConnection>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    #[error("Topology '{0}' requires a key")]
    MissingKey(Topology),

    #[error("Message could not be serialized: {0}")]
    Serialization(String),
}

/// Result of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Targets that were not open.
    pub skipped: usize,
    /// Targets whose send failed.
    pub failed: usize,
}

#[derive(Default)]
struct Registry {
    single: HashMap<String, Connection>,
    grouped: HashMap<String, HashMap<ConnectionId, Connection>>,
    set: HashMap<ConnectionId, Connection>,
}

#[derive(Default)]
pub struct Broadcaster {
    registry: RwLock<Registry>,
}

fn require_key(topology: Topology, key: Option<&str>) -> Result<Option<&str>, BroadcastError> {
    if topology.is_keyed() {
        key.map(Some).ok_or(BroadcastError::MissingKey(topology))
    } else {
        Ok(None)
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` under `topology`/`key`.
    ///
    /// For [`Topology::Single`] this replaces whatever connection held the
    /// key. The displaced connection is not closed; it just stops receiving.
    pub async fn subscribe(
        &self,
        topology: Topology,
        key: Option<&str>,
        connection: Connection,
    ) -> Result<(), BroadcastError> {
        let key = require_key(topology, key)?;
        let mut registry = self.registry.write().await;

        match (topology, key) {
            (Topology::Single, Some(key)) => {
                if let Some(previous) = registry.single.insert(key.to_string(), connection.clone()) {
                    if previous.id() != connection.id() {
                        tracing::debug!(
                            key,
                            displaced = %previous.id(),
                            connection_id = %connection.id(),
                            "Single subscriber replaced"
                        );
                    }
                }
            }
            (Topology::Grouped, Some(key)) => {
                registry
                    .grouped
                    .entry(key.to_string())
                    .or_default()
                    .insert(connection.id(), connection);
            }
            _ => {
                registry.set.insert(connection.id(), connection);
            }
        }
        Ok(())
    }

    /// Remove `connection_id` from `topology`/`key`. Returns false if it was
    /// not registered there.
    pub async fn unsubscribe(
        &self,
        topology: Topology,
        key: Option<&str>,
        connection_id: ConnectionId,
    ) -> Result<bool, BroadcastError> {
        let key = require_key(topology, key)?;
        let mut registry = self.registry.write().await;

        let removed = match (topology, key) {
            (Topology::Single, Some(key)) => {
                // Only the current holder can vacate the key.
                let holds = registry
                    .single
                    .get(key)
                    .map(|held| held.id() == connection_id)
                    .unwrap_or(false);
                holds && registry.single.remove(key).is_some()
            }
            (Topology::Grouped, Some(key)) => {
                let (removed, emptied) = match registry.grouped.get_mut(key) {
                    Some(members) => (members.remove(&connection_id).is_some(), members.is_empty()),
                    None => (false, false),
                };
                if emptied {
                    registry.grouped.remove(key);
                }
                removed
            }
            _ => registry.set.remove(&connection_id).is_some(),
        };
        Ok(removed)
    }

    /// Remove a connection from every topology and key it is registered
    /// under. Returns the number of registrations removed.
    pub async fn deregister(&self, connection_id: ConnectionId) -> usize {
        let mut registry = self.registry.write().await;
        let mut removed = 0;

        registry.single.retain(|_, held| {
            let keep = held.id() != connection_id;
            removed += usize::from(!keep);
            keep
        });
        registry.grouped.retain(|_, members| {
            removed += usize::from(members.remove(&connection_id).is_some());
            !members.is_empty()
        });
        removed += usize::from(registry.set.remove(&connection_id).is_some());

        if removed > 0 {
            tracing::debug!(%connection_id, registrations = removed, "Connection deregistered");
        }
        removed
    }

    /// Serialize `message` once and deliver it to every open target.
    pub async fn broadcast<T: Serialize + ?Sized>(
        &self,
        topology: Topology,
        message: &T,
        key: Option<&str>,
    ) -> Result<DeliveryReport, BroadcastError> {
        let text =
            serde_json::to_string(message).map_err(|e| BroadcastError::Serialization(e.to_string()))?;
        self.broadcast_text(topology, &text, key).await
    }

    /// Deliver pre-serialized `text` to every open target.
    pub async fn broadcast_text(
        &self,
        topology: Topology,
        text: &str,
        key: Option<&str>,
    ) -> Result<DeliveryReport, BroadcastError> {
        let key = require_key(topology, key)?;
        let targets = self.targets(topology, key).await;

        let mut report = DeliveryReport::default();
        for connection in targets {
            if !connection.is_open() {
                report.skipped += 1;
                continue;
            }
            match connection.send(text) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        connection_id = %connection.id(),
                        topology = %topology,
                        error = %e,
                        "Failed to deliver realtime message"
                    );
                }
            }
        }
        Ok(report)
    }

    async fn targets(&self, topology: Topology, key: Option<&str>) -> Vec<Connection> {
        let registry = self.registry.read().await;
        match (topology, key) {
            (Topology::Single, Some(key)) => registry.single.get(key).cloned().into_iter().collect(),
            (Topology::Grouped, Some(key)) => registry
                .grouped
                .get(key)
                .map(|members| members.values().cloned().collect())
                .unwrap_or_default(),
            _ => registry.set.values().cloned().collect(),
        }
    }

    /// Number of connections registered under `topology`/`key`.
    pub async fn subscriber_count(&self, topology: Topology, key: Option<&str>) -> usize {
        let registry = self.registry.read().await;
        match (topology, key) {
            (Topology::Single, Some(key)) => usize::from(registry.single.contains_key(key)),
            (Topology::Grouped, Some(key)) => registry.grouped.get(key).map_or(0, HashMap::len),
            (Topology::Set, _) => registry.set.len(),
            _ => 0,
        }
    }

    /// Returns true if `key` currently exists under a keyed topology.
    pub async fn has_key(&self, topology: Topology, key: &str) -> bool {
        let registry = self.registry.read().await;
        match topology {
            Topology::Single => registry.single.contains_key(key),
            Topology::Grouped => registry.grouped.contains_key(key),
            Topology::Set => false,
        }
    }
}

#[async_trait]
impl ProgressPublisher for Broadcaster {
    async fn publish_progress(&self, event: &ProgressEvent) -> usize {
        let key = event.channel_key();
        match self.broadcast(Topology::Grouped, event, Some(&key)).await {
            Ok(report) => report.delivered,
            Err(e) => {
                tracing::warn!(run_id = %event.run_id, error = %e, "Failed to publish progress");
                0
            }
        }
    }
}
