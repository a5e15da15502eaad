//! swr-vault - An owner-scoped stale-while-revalidate cache for Rust
//!
//! This library provides the data layer behind a client app:
//! - Stale-while-revalidate subscriptions (cached data first, fresh data next)
//! - Deduplication of concurrent fetches for the same key
//! - Focus-triggered and periodic background revalidation
//! - A persistent, versioned, per-user cache with TTL expiry
//!
//! # Example
//!
//! ```ignore
//! use swr_vault::{CacheConfig, CacheKey, FetchError, HashMapStore, SwrEngine, SwrOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(HashMapStore::default());
//!     let engine = SwrEngine::with_store(store, CacheConfig::default());
//!
//!     // Sign-in: entries of any previous user are swept first
//!     engine.set_owner(Some("user1")).await;
//!
//!     // Expenses of May 2024 for user1
//!     let key = CacheKey::with_suffix("gastos", "user1", "2024-05");
//!     let expenses = engine
//!         .subscribe(
//!             Some(key),
//!             |key| async move {
//!                 // Load from the backend - 'key' says what to load
//!                 Ok::<_, FetchError>(vec![format!("expense for {}", key)])
//!             },
//!             SwrOptions::default(),
//!         )
//!         .await;
//!
//!     let state = expenses.wait_for(|s| s.data.is_some()).await;
//!     println!("{:?}", state.data);
//! }
//! ```

mod entry;
mod error;
mod key;
mod service;
mod store;
pub mod stores;
mod swr;
mod utils;

// Re-export public API
pub use entry::{CacheEntry, Invalid, RawEntry};
pub use error::{CacheError, FetchError};
pub use key::{CacheKey, ParseKeyError};
pub use service::{CACHE_VERSION, CacheConfig, CacheService, DEFAULT_TTL};
pub use store::Store;
pub use stores::memory::{HashMapStore, HashMapStoreConfig};
pub use stores::metrics::{CacheMetric, MetricsSink, MetricsStore};
pub use stores::moka::{MokaStore, MokaStoreConfig};
pub use stores::redis::{RedisStore, RedisStoreConfig};
pub use swr::{
    DEFAULT_DEDUPING_INTERVAL, FocusEvent, Subscription, SwrEngine, SwrOptions, SwrState,
};
pub use utils::now_ms;
