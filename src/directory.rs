use std::{
    collections::{HashMap, HashSet},
    fmt,
    net::{IpAddr, SocketAddr},
};

use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::frame::Frame;

/// Handle for pushing frames toward a connection; the owning session's
/// writer task drains the other end into the socket.
pub type Outbox = mpsc::UnboundedSender<Frame>;

/// Identity of a relay on the network: advertise host plus listening port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId {
    pub host: IpAddr,
    pub port: u16,
}

impl PeerId {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self { host, port }
    }

    /// Parses the `host:port` form used in peer-list payloads.
    pub fn parse(entry: &str) -> Option<Self> {
        let (host, port) = entry.rsplit_once(':')?;
        Some(Self::new(host.parse().ok()?, port.parse().ok()?))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RegisterError {
    UsernameTaken,
}

/// Shared registry of live connections.
///
/// Both mappings and the unclassified holding set sit behind one lock, so a
/// duplicate-username check-then-insert is atomic with respect to every
/// other registration. Iteration is only exposed as cloned snapshots.
#[derive(Default)]
pub struct Directory {
    inner: Mutex<Maps>,
}

#[derive(Default)]
struct Maps {
    clients: HashMap<String, Outbox>,
    peers: HashMap<PeerId, Outbox>,
    unclassified: HashSet<SocketAddr>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn track_unclassified(&self, remote: SocketAddr) {
        self.inner.lock().await.unclassified.insert(remote);
    }

    pub async fn forget_unclassified(&self, remote: SocketAddr) {
        self.inner.lock().await.unclassified.remove(&remote);
    }

    pub async fn unclassified_count(&self) -> usize {
        self.inner.lock().await.unclassified.len()
    }

    /// Inserts the username if absent; a taken name is rejected, never
    /// overwritten.
    pub async fn register_client(&self, username: &str, outbox: Outbox) -> Result<(), RegisterError> {
        let mut maps = self.inner.lock().await;
        if maps.clients.contains_key(username) {
            return Err(RegisterError::UsernameTaken);
        }
        maps.clients.insert(username.to_string(), outbox);
        Ok(())
    }

    pub async fn register_peer(&self, id: PeerId, outbox: Outbox) {
        let mut maps = self.inner.lock().await;
        if maps.peers.insert(id, outbox).is_some() {
            debug!(peer = %id, "replaced existing peer registration");
        }
    }

    pub async fn client_outbox(&self, username: &str) -> Option<Outbox> {
        self.inner.lock().await.clients.get(username).cloned()
    }

    pub async fn contains_peer(&self, id: PeerId) -> bool {
        self.inner.lock().await.peers.contains_key(&id)
    }

    pub async fn client_names(&self) -> Vec<String> {
        self.inner.lock().await.clients.keys().cloned().collect()
    }

    pub async fn peer_ids(&self) -> Vec<PeerId> {
        self.inner.lock().await.peers.keys().copied().collect()
    }

    pub async fn peer_outboxes(&self) -> Vec<(PeerId, Outbox)> {
        self.inner
            .lock()
            .await
            .peers
            .iter()
            .map(|(id, outbox)| (*id, outbox.clone()))
            .collect()
    }

    /// Removes the entry only if it still belongs to `outbox`; a newer
    /// connection that reused the name is left alone.
    pub async fn remove_client(&self, username: &str, outbox: &Outbox) {
        let mut maps = self.inner.lock().await;
        if maps
            .clients
            .get(username)
            .is_some_and(|current| current.same_channel(outbox))
        {
            maps.clients.remove(username);
        }
    }

    pub async fn remove_peer(&self, id: PeerId, outbox: &Outbox) {
        let mut maps = self.inner.lock().await;
        if maps
            .peers
            .get(&id)
            .is_some_and(|current| current.same_channel(outbox))
        {
            maps.peers.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbox() -> (Outbox, mpsc::UnboundedReceiver<Frame>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn rejects_duplicate_usernames() {
        let directory = Directory::new();
        let (first, _first_rx) = outbox();
        directory
            .register_client("alice", first)
            .await
            .expect("first registration should pass");

        let (second, _second_rx) = outbox();
        let result = directory.register_client("alice", second).await;
        assert_eq!(result, Err(RegisterError::UsernameTaken));
        assert_eq!(directory.client_names().await, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn removal_checks_channel_identity() {
        let directory = Directory::new();
        let (current, _current_rx) = outbox();
        directory
            .register_client("alice", current.clone())
            .await
            .expect("registration");

        let (stale, _stale_rx) = outbox();
        directory.remove_client("alice", &stale).await;
        assert!(directory.client_outbox("alice").await.is_some());

        directory.remove_client("alice", &current).await;
        assert!(directory.client_outbox("alice").await.is_none());
    }

    #[tokio::test]
    async fn peer_snapshot_lists_registered_ids() {
        let directory = Directory::new();
        let a = PeerId::new("127.0.0.1".parse().unwrap(), 30001);
        let b = PeerId::new("127.0.0.1".parse().unwrap(), 30002);
        let (tx_a, _rx_a) = outbox();
        let (tx_b, _rx_b) = outbox();
        directory.register_peer(a, tx_a).await;
        directory.register_peer(b, tx_b).await;

        let mut ids = directory.peer_ids().await;
        ids.sort_by_key(|id| id.port);
        assert_eq!(ids, vec![a, b]);
        assert!(directory.contains_peer(a).await);
    }

    #[tokio::test]
    async fn tracks_unclassified_connections() {
        let directory = Directory::new();
        let remote: SocketAddr = "127.0.0.1:55555".parse().unwrap();
        directory.track_unclassified(remote).await;
        assert_eq!(directory.unclassified_count().await, 1);
        directory.forget_unclassified(remote).await;
        assert_eq!(directory.unclassified_count().await, 0);
    }

    #[test]
    fn peer_id_parses_host_port() {
        let id = PeerId::parse("127.0.0.1:30000").expect("valid address");
        assert_eq!(id.port, 30000);
        assert_eq!(id.to_string(), "127.0.0.1:30000");
        assert!(PeerId::parse("localhost:30000").is_none());
        assert!(PeerId::parse("127.0.0.1").is_none());
        assert!(PeerId::parse("127.0.0.1:notaport").is_none());
    }
}
