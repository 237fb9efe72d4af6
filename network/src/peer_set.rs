//! Known peers and their liveness.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::NetworkError;

/// Peer address → whether the last send to it succeeded.
///
/// Entries are only ever added. Callers must not hold a snapshot's lock
/// across network I/O; every method takes the lock for one map operation.
pub struct PeerSet {
    peers: RwLock<HashMap<String, bool>>,
    max_peers: usize,
}

impl PeerSet {
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            max_peers,
        }
    }

    /// Add `address` as alive. Returns `false` if it was already known.
    pub async fn insert(&self, address: &str) -> Result<bool, NetworkError> {
        let mut peers = self.peers.write().await;
        if peers.contains_key(address) {
            return Ok(false);
        }
        if peers.len() >= self.max_peers {
            return Err(NetworkError::PeerLimit(self.max_peers));
        }
        peers.insert(address.to_string(), true);
        debug!(peer = address, total = peers.len(), "peer added");
        Ok(true)
    }

    pub async fn contains(&self, address: &str) -> bool {
        self.peers.read().await.contains_key(address)
    }

    /// Record the outcome of a send. Unknown addresses are ignored.
    pub async fn mark(&self, address: &str, alive: bool) {
        if let Some(state) = self.peers.write().await.get_mut(address) {
            *state = alive;
        }
    }

    pub async fn is_alive(&self, address: &str) -> Option<bool> {
        self.peers.read().await.get(address).copied()
    }

    /// Every known address, sorted.
    pub async fn addresses(&self) -> Vec<String> {
        let mut addrs: Vec<String> = self.peers.read().await.keys().cloned().collect();
        addrs.sort();
        addrs
    }

    pub async fn entries(&self) -> Vec<(String, bool)> {
        let mut entries: Vec<(String, bool)> = self
            .peers
            .read()
            .await
            .iter()
            .map(|(addr, alive)| (addr.clone(), *alive))
            .collect();
        entries.sort();
        entries
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }

    pub async fn alive_count(&self) -> usize {
        self.peers.read().await.values().filter(|alive| **alive).count()
    }

    pub fn max_peers(&self) -> usize {
        self.max_peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_is_idempotent() {
        let set = PeerSet::new(10);
        assert!(set.insert("a:1").await.unwrap());
        assert!(!set.insert("a:1").await.unwrap());
        assert_eq!(set.len().await, 1);
        assert_eq!(set.is_alive("a:1").await, Some(true));
    }

    #[tokio::test]
    async fn capped_at_max_peers() {
        let set = PeerSet::new(2);
        set.insert("a:1").await.unwrap();
        set.insert("b:1").await.unwrap();
        assert!(matches!(set.insert("c:1").await, Err(NetworkError::PeerLimit(2))));
        assert!(!set.insert("a:1").await.unwrap());
    }

    #[tokio::test]
    async fn liveness_follows_marks() {
        let set = PeerSet::new(10);
        set.insert("a:1").await.unwrap();
        set.insert("b:1").await.unwrap();
        set.mark("a:1", false).await;
        set.mark("zzz:1", false).await;

        assert_eq!(set.alive_count().await, 1);
        assert_eq!(
            set.entries().await,
            vec![("a:1".to_string(), false), ("b:1".to_string(), true)]
        );
        assert!(!set.contains("zzz:1").await);
    }
}
