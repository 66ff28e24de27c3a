//! Repository stores.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use hydra_core::{HeadStatus, PartyId};
use tokio::sync::RwLock;

/// Minimal key/value repository.
///
/// Writes are last-writer-wins; callers that insert the same derived value twice
/// need no coordination.
#[async_trait]
pub trait Repository<K, V>: Send + Sync {
    /// Get the value stored for a key.
    async fn get(&self, key: &K) -> Option<V>;

    /// Store a value, replacing any previous one.
    async fn put(&self, key: K, value: V);

    /// Number of stored entries.
    async fn len(&self) -> usize;
}

/// Cache of party id -> bech32 address. Append-only in practice: an address
/// never changes for the lifetime of its key pair.
pub type AddressStore = dyn Repository<PartyId, String>;

/// Last observed head status per party.
pub type StatusStore = dyn Repository<PartyId, HeadStatus>;

/// In-memory implementation of [`Repository`].
pub struct InMemoryRepository<K, V> {
    entries: Arc<RwLock<HashMap<K, V>>>,
}

impl<K, V> InMemoryRepository<K, V> {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<K, V> Default for InMemoryRepository<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for InMemoryRepository<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

#[async_trait]
impl<K, V> Repository<K, V> for InMemoryRepository<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries.get(key).cloned()
    }

    async fn put(&self, key: K, value: V) {
        let mut entries = self.entries.write().await;
        entries.insert(key, value);
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
