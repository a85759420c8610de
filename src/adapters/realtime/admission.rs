//! Per-address admission control for realtime connections.
//!
//! Each client address may hold at most `max_per_address` open
//! connections. The check is synchronous: [`AdmissionController::check_limit`]
//! returns a ticket that answers immediately and, on `add`, reserves the
//! slot atomically with respect to other connections from the same address.
//!
//! Closed connections are released explicitly on close and, as a backstop,
//! by a periodic sweep started with [`AdmissionController::start`].

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time;

use crate::domain::foundation::{ConnectionId, Timestamp};
use crate::ports::RealtimeConnection;

struct Tracked {
    connection: Arc<dyn RealtimeConnection>,
    created_at: Timestamp,
}

struct Sweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct AdmissionController {
    max_per_address: usize,
    connections: DashMap<IpAddr, Vec<Tracked>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl AdmissionController {
    pub fn new(max_per_address: usize) -> Self {
        Self {
            max_per_address,
            connections: DashMap::new(),
            sweeper: Mutex::new(None),
        }
    }

    pub fn max_per_address(&self) -> usize {
        self.max_per_address
    }

    /// Ticket for a connection attempt from `address`.
    pub fn check_limit(&self, address: IpAddr) -> AdmissionTicket<'_> {
        AdmissionTicket {
            controller: self,
            address,
        }
    }

    /// Forget `connection_id` for `address`. Returns true if it was tracked.
    pub fn release(&self, address: IpAddr, connection_id: ConnectionId) -> bool {
        let mut removed = false;
        let emptied = match self.connections.get_mut(&address) {
            Some(mut tracked) => {
                let before = tracked.len();
                tracked.retain(|t| t.connection.id() != connection_id);
                removed = tracked.len() != before;
                tracked.is_empty()
            }
            None => false,
        };
        if emptied {
            self.connections.remove_if(&address, |_, tracked| tracked.is_empty());
        }
        removed
    }

    /// Open connections currently tracked for `address`.
    pub fn open_count(&self, address: IpAddr) -> usize {
        self.connections
            .get(&address)
            .map(|tracked| tracked.iter().filter(|t| t.connection.is_open()).count())
            .unwrap_or(0)
    }

    /// Tracked connections for `address` with their admission time, oldest first.
    pub fn connections(&self, address: IpAddr) -> Vec<(ConnectionId, Timestamp)> {
        self.connections
            .get(&address)
            .map(|tracked| {
                tracked
                    .iter()
                    .map(|t| (t.connection.id(), t.created_at))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of addresses with at least one tracked connection.
    pub fn tracked_addresses(&self) -> usize {
        self.connections.len()
    }

    /// Drop closed connections and addresses left with none. Returns the
    /// number of connections pruned.
    pub fn sweep(&self) -> usize {
        let mut pruned = 0;
        self.connections.retain(|_, tracked| {
            let before = tracked.len();
            tracked.retain(|t| t.connection.is_open());
            pruned += before - tracked.len();
            !tracked.is_empty()
        });
        if pruned > 0 {
            tracing::debug!(pruned, "Swept closed realtime connections");
        }
        pruned
    }

    /// Start the periodic sweep. Calling it again while running is a no-op.
    pub async fn start(self: &Arc<Self>, interval: Duration) {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_some() {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let controller = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        controller.sweep();
                    }
                }
            }
        });

        tracing::info!(interval_secs = interval.as_secs(), "Admission sweep started");
        *sweeper = Some(Sweeper {
            shutdown: shutdown_tx,
            handle,
        });
    }

    /// Stop the periodic sweep and wait for it to finish.
    pub async fn stop(&self) {
        let Some(sweeper) = self.sweeper.lock().await.take() else {
            return;
        };
        let _ = sweeper.shutdown.send(true);
        if let Err(e) = sweeper.handle.await {
            tracing::warn!(error = %e, "Admission sweep ended abnormally");
        }
        tracing::info!("Admission sweep stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.sweeper.lock().await.is_some()
    }
}

/// Result of [`AdmissionController::check_limit`] for one address.
pub struct AdmissionTicket<'a> {
    controller: &'a AdmissionController,
    address: IpAddr,
}

impl AdmissionTicket<'_> {
    /// Returns true if the address has a free slot right now.
    pub fn is_allowed(&self) -> bool {
        self.remaining() > 0
    }

    /// Reserve a slot for `connection`. Returns false when the address is at
    /// capacity; the caller must then refuse the connection. Adding the same
    /// connection twice is a no-op that returns true.
    pub fn add(&self, connection: Arc<dyn RealtimeConnection>) -> bool {
        let controller = self.controller;
        let mut tracked = controller.connections.entry(self.address).or_default();
        tracked.retain(|t| t.connection.is_open());

        if tracked.iter().any(|t| t.connection.id() == connection.id()) {
            return true;
        }
        if tracked.len() >= controller.max_per_address {
            tracing::info!(
                address = %self.address,
                limit = controller.max_per_address,
                "Realtime connection refused, address at capacity"
            );
            return false;
        }

        tracked.push(Tracked {
            connection,
            created_at: Timestamp::now(),
        });
        true
    }

    /// Release `connection_id` immediately.
    pub fn remove(&self, connection_id: ConnectionId) -> bool {
        self.controller.release(self.address, connection_id)
    }

    /// Free slots left for this address.
    pub fn remaining(&self) -> usize {
        self.controller
            .max_per_address
            .saturating_sub(self.controller.open_count(self.address))
    }
}
