use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::entry::CacheEntry;
use crate::key::CacheKey;
use crate::store::Store;
use crate::utils::now_ms;

/// Format version stamped on every entry. Bumping it invalidates every
/// previously written entry on its next read.
pub const CACHE_VERSION: &str = "v1";

/// Entries are valid for this long after their last write.
pub const DEFAULT_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Configuration for CacheService.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Version tag written into and required from every entry.
    pub version: String,

    /// Time to live, measured from the write. Reads do not extend it.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            version: CACHE_VERSION.to_string(),
            ttl: DEFAULT_TTL,
        }
    }
}

/// Who the cache currently serves.
#[derive(Debug, Default)]
struct OwnerGate {
    active: Option<String>,
    /// Owners switched away from (logout or account switch). Their reads
    /// miss and their writes are dropped until they are declared again.
    retired: HashSet<String>,
}

impl OwnerGate {
    fn accepts(&self, key: &CacheKey) -> bool {
        if self.retired.contains(key.owner()) {
            return false;
        }
        match &self.active {
            Some(owner) => owner == key.owner(),
            None => true,
        }
    }

    /// Forget the active owner, remembering it as retired.
    fn retire_active(&mut self) -> Option<String> {
        let previous = self.active.take()?;
        self.retired.insert(previous.clone());
        Some(previous)
    }
}

/// Persistent, owner-scoped, expiring cache over an opaque `Store`.
///
/// The cache is best-effort: store failures are logged and absorbed, so no
/// method here returns an error. A failed read is a miss, a failed write is
/// a no-op.
///
/// # Owner isolation
///
/// Entries are stamped with the owner they were written for and only served
/// back to that owner. Once an active owner is declared with
/// [`set_owner`](Self::set_owner), operations on behalf of any other owner
/// are ignored. Switching owners, to another one or to `None`, sweeps the
/// previous owner's entries while holding the owner gate exclusively, so no
/// read or write can interleave with the sweep. The previous owner stays
/// shut out afterwards, so a fetch still running on its behalf cannot write
/// its data back.
pub struct CacheService {
    store: Arc<dyn Store>,
    version: String,
    ttl: Duration,
    /// Readers of the gate are cache operations; the writer is an owner
    /// switch or a full clear.
    gate: RwLock<OwnerGate>,
}

impl CacheService {
    /// Create a new CacheService.
    ///
    /// # Example
    /// ```ignore
    /// let store = Arc::new(HashMapStore::default());
    /// let cache = CacheService::new(store, CacheConfig::default());
    /// ```
    pub fn new(store: Arc<dyn Store>, config: CacheConfig) -> Self {
        CacheService {
            store,
            version: config.version,
            ttl: config.ttl,
            gate: RwLock::new(OwnerGate::default()),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The currently declared owner, if any.
    pub async fn current_owner(&self) -> Option<String> {
        self.gate.read().await.active.clone()
    }

    /// Return the cached value.
    ///
    /// Returns `None` for misses, for entries that are expired or belong to
    /// another owner or version (those are deleted on the spot), and for any
    /// store failure.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let gate = self.gate.read().await;
        if !gate.accepts(key) {
            debug!(key = %key, "cache read for inactive owner ignored");
            return None;
        }

        let storage_key = key.storage_key(&self.version);
        let raw = match self.store.get(&storage_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %key, tier = self.store.name(), error = %e, "cache read failed");
                return None;
            }
        };

        if let Err(reason) = raw.validate(now_ms(), self.ttl, key.owner(), &self.version) {
            debug!(key = %key, ?reason, "discarding invalid cache entry");
            self.discard(&storage_key).await;
            return None;
        }

        match raw.into_typed::<T>() {
            Ok(entry) => {
                debug!(key = %key, "cache hit");
                Some(entry.data)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "discarding undecodable cache entry");
                self.discard(&storage_key).await;
                None
            }
        }
    }

    /// Write `data` under `key`, stamped with the current time, the key's
    /// owner and the cache version. Any previous entry is replaced.
    pub async fn set<T: Serialize>(&self, key: &CacheKey, data: &T) {
        let gate = self.gate.read().await;
        if !gate.accepts(key) {
            debug!(key = %key, "cache write for inactive owner dropped");
            return;
        }

        let entry = CacheEntry::new(data, now_ms(), key.owner(), self.version.as_str());
        let raw = match entry.into_raw() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "cache write skipped");
                return;
            }
        };

        if let Err(e) = self.store.set(&key.storage_key(&self.version), raw).await {
            warn!(key = %key, tier = self.store.name(), error = %e, "cache write failed");
        }
    }

    /// Whether a valid entry exists for `key`.
    pub async fn has_cache(&self, key: &CacheKey) -> bool {
        self.get::<serde_json::Value>(key).await.is_some()
    }

    /// Remove the entry for `key`.
    pub async fn remove(&self, key: &CacheKey) {
        let _gate = self.gate.read().await;
        self.discard(&key.storage_key(&self.version)).await;
    }

    /// Remove every entry written for `owner`, across resources, suffixes
    /// and versions.
    pub async fn clear_owner_cache(&self, owner: &str) {
        let _gate = self.gate.read().await;
        self.sweep_owner(owner).await;
    }

    /// Remove every entry regardless of owner and forget the active owner.
    ///
    /// The forgotten owner is shut out like after a switch until it is
    /// declared again.
    pub async fn clear_all(&self) {
        let mut gate = self.gate.write().await;
        if let Err(e) = self.store.clear().await {
            warn!(tier = self.store.name(), error = %e, "cache clear failed");
        }
        gate.retire_active();
    }

    /// Declare the active owner.
    ///
    /// When the owner changes, the previous owner's entries are swept before
    /// the gate is released, so the first operation for the new owner only
    /// ever sees a cache without them.
    pub async fn set_owner(&self, owner: Option<&str>) {
        let mut gate = self.gate.write().await;
        if gate.active.as_deref() == owner {
            return;
        }

        if let Some(previous) = gate.retire_active() {
            debug!(previous = %previous, next = ?owner, "switching cache owner");
            self.sweep_owner(&previous).await;
        }
        if let Some(next) = owner {
            gate.retired.remove(next);
        }
        gate.active = owner.map(str::to_string);
    }

    async fn sweep_owner(&self, owner: &str) {
        let keys = match self.store.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(owner, tier = self.store.name(), error = %e, "cache scan failed");
                return;
            }
        };

        let owned: Vec<&str> = keys
            .iter()
            .filter(|raw| {
                CacheKey::from_storage_key(raw).is_some_and(|(_, key)| key.owner() == owner)
            })
            .map(String::as_str)
            .collect();

        if owned.is_empty() {
            return;
        }

        debug!(owner, count = owned.len(), "clearing owner cache");
        if let Err(e) = self.store.remove(&owned).await {
            warn!(owner, tier = self.store.name(), error = %e, "owner cache clear failed");
        }
    }

    async fn discard(&self, storage_key: &str) {
        if let Err(e) = self.store.remove(&[storage_key]).await {
            warn!(
                key = storage_key,
                tier = self.store.name(),
                error = %e,
                "cache remove failed"
            );
        }
    }
}
