use async_trait::async_trait;

use crate::entry::RawEntry;
use crate::error::CacheError;

/// A store is the persistent key-value backend behind `CacheService`.
///
/// Stores are opaque to the rest of the crate: they hold `RawEntry` values
/// under string keys and know nothing about owners, versions or TTLs. All
/// validity checks happen in `CacheService`.
#[async_trait]
pub trait Store: Send + Sync {
    /// A name for metrics/tracing.
    ///
    /// # Example
    /// - "hashmap"
    /// - "moka"
    /// - "redis"
    fn name(&self) -> &'static str;

    /// Return the stored entry.
    ///
    /// The response must be `None` for cache misses.
    async fn get(&self, key: &str) -> Result<Option<RawEntry>, CacheError>;

    /// Sets the entry for the given key, replacing any previous one.
    async fn set(&self, key: &str, entry: RawEntry) -> Result<(), CacheError>;

    /// Removes the key(s) from the store.
    async fn remove(&self, keys: &[&str]) -> Result<(), CacheError>;

    /// Every key currently held by the store.
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Removes every entry.
    async fn clear(&self) -> Result<(), CacheError>;
}
