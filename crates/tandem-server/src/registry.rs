//! In-memory presence bookkeeping.
//!
//! The registry maps each authenticated identity to the set of its live
//! transport connections. One identity may hold several simultaneous
//! connections (multiple devices/tabs); fan-out must reach all of them.
//!
//! The registry is an owned object on the engine, not a process global,
//! and holds no business data. All reads used for fan-out are snapshot
//! copies, so iteration never races with register/deregister.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use tandem_shared::protocol::ServerEvent;
use tandem_shared::types::UserId;

/// Unique id of one live transport connection.
pub type ConnId = Uuid;

/// The send side of one live connection.
///
/// Events pushed here are drained by the connection's writer task onto the
/// actual socket; when that task goes away the channel closes and the
/// handle becomes prunable.
#[derive(Debug, Clone)]
pub struct ConnHandle {
    pub conn_id: ConnId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnHandle {
    pub fn new(conn_id: ConnId, tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { conn_id, tx }
    }

    /// Push an event toward the socket. Returns `false` if the connection
    /// is already gone; the caller should deregister it.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct Entry {
    handle: ConnHandle,
    connected_at: Instant,
}

/// Identity -> live connections map, shared across connection workers.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<HashMap<UserId, HashMap<ConnId, Entry>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Add a handle to the identity's set, creating the set if absent.
    /// Registering the same connection twice just replaces the entry.
    pub async fn register(&self, owner: UserId, handle: ConnHandle) {
        let mut map = self.inner.lock().await;
        let conn_id = handle.conn_id;
        map.entry(owner).or_default().insert(
            conn_id,
            Entry {
                handle,
                connected_at: Instant::now(),
            },
        );
        tracing::debug!(user = %owner, conn = %conn_id, "connection registered");
    }

    /// Remove one handle; drops the identity entry entirely once its set is
    /// empty so churn cannot grow the map without bound. Safe to call for a
    /// connection that was never registered.
    pub async fn deregister(&self, owner: UserId, conn_id: ConnId) {
        let mut map = self.inner.lock().await;
        if let Some(conns) = map.get_mut(&owner) {
            if let Some(entry) = conns.remove(&conn_id) {
                tracing::debug!(
                    user = %owner,
                    conn = %conn_id,
                    session_secs = entry.connected_at.elapsed().as_secs(),
                    "connection deregistered"
                );
            }
            if conns.is_empty() {
                map.remove(&owner);
            }
        }
    }

    /// Snapshot of the identity's currently-live handles, for fan-out.
    ///
    /// Handles whose channel is already closed are pruned here rather than
    /// returned; pruning is routine maintenance, never an error.
    pub async fn live_handles_for(&self, owner: UserId) -> Vec<ConnHandle> {
        let mut map = self.inner.lock().await;
        let Some(conns) = map.get_mut(&owner) else {
            return Vec::new();
        };

        conns.retain(|conn_id, entry| {
            let alive = !entry.handle.is_closed();
            if !alive {
                tracing::debug!(user = %owner, conn = %conn_id, "pruned dead connection");
            }
            alive
        });

        let handles: Vec<ConnHandle> = conns.values().map(|e| e.handle.clone()).collect();
        if handles.is_empty() {
            map.remove(&owner);
        }
        handles
    }

    /// Whether the identity has at least one live connection.
    pub async fn is_online(&self, owner: UserId) -> bool {
        !self.live_handles_for(owner).await.is_empty()
    }

    /// Total number of live connections, across all identities.
    pub async fn connection_count(&self) -> usize {
        let map = self.inner.lock().await;
        map.values().map(|conns| conns.len()).sum()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnHandle::new(Uuid::new_v4(), tx), rx)
    }

    #[tokio::test]
    async fn multi_device_registration() {
        let registry = ConnectionRegistry::new();
        let (h1, _rx1) = handle();
        let (h2, _rx2) = handle();

        registry.register(UserId(1), h1).await;
        registry.register(UserId(1), h2).await;

        assert_eq!(registry.live_handles_for(UserId(1)).await.len(), 2);
        assert!(registry.is_online(UserId(1)).await);
        assert!(!registry.is_online(UserId(2)).await);
        assert_eq!(registry.connection_count().await, 2);
    }

    #[tokio::test]
    async fn deregister_removes_empty_identity() {
        let registry = ConnectionRegistry::new();
        let (h, _rx) = handle();
        let conn_id = h.conn_id;

        registry.register(UserId(1), h).await;
        registry.deregister(UserId(1), conn_id).await;

        assert!(!registry.is_online(UserId(1)).await);
        assert_eq!(registry.connection_count().await, 0);

        // Deregistering again (or a never-registered conn) is harmless.
        registry.deregister(UserId(1), conn_id).await;
        registry.deregister(UserId(7), Uuid::new_v4()).await;
    }

    #[tokio::test]
    async fn snapshot_prunes_closed_handles() {
        let registry = ConnectionRegistry::new();
        let (h1, rx1) = handle();
        let (h2, _rx2) = handle();

        registry.register(UserId(1), h1).await;
        registry.register(UserId(1), h2).await;

        // First connection's reader side goes away.
        drop(rx1);

        let live = registry.live_handles_for(UserId(1)).await;
        assert_eq!(live.len(), 1);
        assert!(!live[0].is_closed());

        // Pruning is persistent, not just filtered from the snapshot.
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn all_handles_closed_means_offline() {
        let registry = ConnectionRegistry::new();
        let (h, rx) = handle();
        registry.register(UserId(1), h).await;
        drop(rx);

        assert!(!registry.is_online(UserId(1)).await);
        assert_eq!(registry.connection_count().await, 0);
    }
}
