use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, MutexGuard, RwLock};

/// Write side of one live connection.
///
/// Every outbound write goes through the mutex, so a file push and an ad hoc
/// send never interleave their bytes on the stream.
#[derive(Clone)]
pub struct ConnectionHandle {
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

impl ConnectionHandle {
    pub fn new(writer: OwnedWriteHalf) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Exclusive access to the stream for the lifetime of the guard.
    pub async fn lock(&self) -> MutexGuard<'_, OwnedWriteHalf> {
        self.writer.lock().await
    }
}

/// Live connections keyed by connection identifier (peer address).
#[derive(Default)]
pub struct Registry {
    connections: RwLock<HashMap<String, ConnectionHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the identifier was already registered; the existing
    /// handle is kept in that case.
    pub async fn insert(&self, conn_id: &str, handle: ConnectionHandle) -> bool {
        let mut conns = self.connections.write().await;
        if conns.contains_key(conn_id) {
            return false;
        }
        conns.insert(conn_id.to_string(), handle);
        true
    }

    pub async fn remove(&self, conn_id: &str) -> Option<ConnectionHandle> {
        self.connections.write().await.remove(conn_id)
    }

    pub async fn get(&self, conn_id: &str) -> Option<ConnectionHandle> {
        self.connections.read().await.get(conn_id).cloned()
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }
}
