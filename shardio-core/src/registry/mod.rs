//! Node registry for storage membership and fragment routing
//!
//! Membership is append-only and kept in registration order. Selection hashes
//! a routing key and indexes into that order, so adding a node shifts the
//! placement of every key that lands past the old modulus.

pub mod selection;

use crate::error::{Result, ShardError};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

pub use selection::{fnv1_64, selection_key};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageNode {
    pub address: String,
}

pub struct NodeRegistry {
    nodes: Mutex<Vec<StorageNode>>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
        }
    }

    /// Append a node to the membership list.
    pub async fn register(&self, address: &str) -> Result<StorageNode> {
        if address.is_empty() {
            return Err(ShardError::InvalidAddress(address.to_string()));
        }

        let mut nodes = self.nodes.lock().await;
        if nodes.iter().any(|node| node.address == address) {
            return Err(ShardError::AlreadyRegistered(address.to_string()));
        }

        let node = StorageNode {
            address: address.to_string(),
        };
        nodes.push(node.clone());

        tracing::info!("Registered storage node {} ({} nodes)", address, nodes.len());
        Ok(node)
    }

    /// Pick the node owning `key`, or `None` while membership is empty.
    pub async fn select(&self, key: &[u8]) -> Option<StorageNode> {
        let nodes = self.nodes.lock().await;
        if nodes.is_empty() {
            return None;
        }

        let index = fnv1_64(key) % nodes.len() as u64;
        nodes.get(index as usize).cloned()
    }

    pub async fn nodes(&self) -> Vec<StorageNode> {
        self.nodes.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.nodes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_rejects_empty_and_duplicate_addresses() {
        let registry = NodeRegistry::new();

        assert!(matches!(
            registry.register("").await,
            Err(ShardError::InvalidAddress(_))
        ));
        // only the empty string is refused
        registry.register(" ").await.unwrap();

        registry.register("10.0.0.1:6571").await.unwrap();
        assert!(matches!(
            registry.register("10.0.0.1:6571").await,
            Err(ShardError::AlreadyRegistered(address)) if address == "10.0.0.1:6571"
        ));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_select_without_nodes_is_empty() {
        let registry = NodeRegistry::new();
        assert!(registry.select(b"anything").await.is_none());
    }

    #[tokio::test]
    async fn test_select_is_deterministic_and_follows_registration_order() {
        let registry = NodeRegistry::new();
        for address in ["a:1", "b:1", "c:1"] {
            registry.register(address).await.unwrap();
        }

        let key = selection_key("movie.mkv", 4096, b"payload");
        let first = registry.select(&key).await.unwrap();
        for _ in 0..16 {
            assert_eq!(registry.select(&key).await.unwrap(), first);
        }

        let expected = (fnv1_64(&key) % 3) as usize;
        assert_eq!(registry.nodes().await[expected], first);
    }

    #[tokio::test]
    async fn test_single_node_receives_every_key() {
        let registry = NodeRegistry::new();
        registry.register("only:1").await.unwrap();

        for total in 0..32u64 {
            let key = selection_key("f", total, &[total as u8]);
            assert_eq!(registry.select(&key).await.unwrap().address, "only:1");
        }
    }
}
