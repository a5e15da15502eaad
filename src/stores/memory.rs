use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::entry::RawEntry;
use crate::error::CacheError;
use crate::store::Store;

/// Configuration for HashMapStore.
#[derive(Debug, Clone, Default)]
pub struct HashMapStoreConfig {
    /// Upper bound on held entries. When a `set` would exceed it, the
    /// oldest entries (by write timestamp) are dropped first.
    /// `None` means unbounded.
    pub max_items: Option<usize>,
}

/// Thread-safe in-memory store using HashMap with RwLock.
///
/// This is a simple, zero-dependency store suitable for:
/// - Tests and local development
/// - Single-process apps that only need cross-component deduplication
/// - Small to medium cache sizes (<1000 items)
///
/// For larger working sets, consider using `MokaStore` instead.
pub struct HashMapStore {
    state: RwLock<HashMap<String, RawEntry>>,
    max_items: Option<usize>,
}

impl HashMapStore {
    /// Create a new HashMapStore with the given configuration.
    pub fn new(config: HashMapStoreConfig) -> Self {
        HashMapStore {
            state: RwLock::new(HashMap::new()),
            max_items: config.max_items,
        }
    }

    /// Number of held entries, including ones `CacheService` would reject.
    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.is_empty()
    }

    fn evict_oldest(state: &mut HashMap<String, RawEntry>, max_items: usize) {
        if state.len() <= max_items {
            return;
        }

        let mut entries: Vec<_> = state
            .iter()
            .map(|(k, v)| (k.clone(), v.timestamp))
            .collect();
        entries.sort_by_key(|(_, timestamp)| *timestamp);

        let to_remove = state.len() - max_items;
        for (key, _) in entries.into_iter().take(to_remove) {
            state.remove(&key);
        }
    }
}

impl Default for HashMapStore {
    fn default() -> Self {
        Self::new(HashMapStoreConfig::default())
    }
}

#[async_trait]
impl Store for HashMapStore {
    fn name(&self) -> &'static str {
        "hashmap"
    }

    async fn get(&self, key: &str) -> Result<Option<RawEntry>, CacheError> {
        let state = self.state.read().await;
        Ok(state.get(key).cloned())
    }

    async fn set(&self, key: &str, entry: RawEntry) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        state.insert(key.to_string(), entry);

        if let Some(max_items) = self.max_items {
            Self::evict_oldest(&mut state, max_items);
        }
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), CacheError> {
        let mut state = self.state.write().await;

        for key in keys {
            state.remove(*key);
        }

        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let state = self.state.read().await;
        Ok(state.keys().cloned().collect())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.state.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::CacheEntry;
    use serde_json::json;

    fn entry(owner: &str, timestamp: i64) -> RawEntry {
        CacheEntry::new(json!({"monto": 100}), timestamp, owner, "v1")
    }

    #[tokio::test]
    async fn test_get_set_remove() {
        let store = HashMapStore::default();

        // Initially empty
        let result = store.get("v1:gastos:user1").await.unwrap();
        assert!(result.is_none());

        store
            .set("v1:gastos:user1", entry("user1", 1))
            .await
            .unwrap();

        let result = store.get("v1:gastos:user1").await.unwrap();
        assert_eq!(result.unwrap().owner_id, "user1");

        store.remove(&["v1:gastos:user1"]).await.unwrap();

        let result = store.get("v1:gastos:user1").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_keys_and_clear() {
        let store = HashMapStore::default();
        store.set("a", entry("user1", 1)).await.unwrap();
        store.set("b", entry("user2", 2)).await.unwrap();

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        store.clear().await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_max_items_drops_oldest() {
        let store = HashMapStore::new(HashMapStoreConfig { max_items: Some(2) });
        store.set("old", entry("user1", 10)).await.unwrap();
        store.set("mid", entry("user1", 20)).await.unwrap();
        store.set("new", entry("user1", 30)).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.get("new").await.unwrap().is_some());
    }
}
