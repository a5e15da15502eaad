use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Serialize, de::DeserializeOwned};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::key::CacheKey;
use crate::service::{CacheConfig, CacheService};
use crate::store::Store;

/// Minimum spacing between two real fetches of the same key.
pub const DEFAULT_DEDUPING_INTERVAL: Duration = Duration::from_millis(2_000);

/// Fetch results travel type-erased through the shared registry; each
/// caller downcasts back to its own `V`.
type Erased = Arc<dyn Any + Send + Sync>;

type SharedFetch = Shared<BoxFuture<'static, Result<Erased, FetchError>>>;

type Fetcher<V> =
    Arc<dyn Fn(CacheKey) -> BoxFuture<'static, Result<V, FetchError>> + Send + Sync>;

/// Options for a subscription.
#[derive(Debug, Clone)]
pub struct SwrOptions {
    /// Fetch right after a cache hit too, not only on a miss.
    pub revalidate_on_mount: bool,

    /// A fetch for a key started less than this long ago is joined instead
    /// of repeated.
    pub deduping_interval: Duration,

    /// Revalidate in background on [`FocusEvent`]s, once data was loaded.
    pub revalidate_on_focus: bool,

    /// Periodic revalidation. The timer lives as long as the subscription.
    pub revalidate_interval: Option<Duration>,
}

impl Default for SwrOptions {
    fn default() -> Self {
        SwrOptions {
            revalidate_on_mount: false,
            deduping_interval: DEFAULT_DEDUPING_INTERVAL,
            revalidate_on_focus: true,
            revalidate_interval: None,
        }
    }
}

/// Signals that the user is looking at the app again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusEvent {
    /// The window regained focus.
    WindowFocus,
    /// The document became visible.
    Visible,
}

/// What a consumer renders.
#[derive(Debug, Clone)]
pub struct SwrState<V> {
    /// Last known value, from cache or network.
    pub data: Option<V>,
    /// Last fetch error. Cleared when a new fetch starts.
    pub error: Option<FetchError>,
    /// A fetch is running and nothing was shown yet (or a load was forced).
    pub is_validating: bool,
    /// A fetch is running behind already shown data.
    pub is_revalidating: bool,
}

impl<V> Default for SwrState<V> {
    fn default() -> Self {
        SwrState {
            data: None,
            error: None,
            is_validating: false,
            is_revalidating: false,
        }
    }
}

impl<V> SwrState<V> {
    pub fn is_loading(&self) -> bool {
        self.is_validating || self.is_revalidating
    }
}

struct InFlight {
    generation: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct Registry {
    in_flight: HashMap<String, InFlight>,
    last_fetch: HashMap<String, Instant>,
}

struct EngineInner {
    cache: Arc<CacheService>,
    /// Only ever locked for synchronous bookkeeping, never across an await.
    registry: Mutex<Registry>,
    generation: AtomicU64,
    focus: broadcast::Sender<FocusEvent>,
}

impl EngineInner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Stale-while-revalidate engine.
///
/// Owns the in-flight and last-fetch registries shared by every
/// subscription. Clones share them too, so an app creates one engine and
/// hands clones around.
///
/// # Example
/// ```ignore
/// let engine = SwrEngine::with_store(Arc::new(HashMapStore::default()), CacheConfig::default());
/// engine.set_owner(Some("user1")).await;
///
/// let key: CacheKey = "gastos-user1-2024-05".parse()?;
/// let gastos = engine
///     .subscribe(Some(key), |key| async move { api.expenses(&key).await }, SwrOptions::default())
///     .await;
/// let state = gastos.wait_for(|s| !s.is_loading()).await;
/// ```
#[derive(Clone)]
pub struct SwrEngine {
    inner: Arc<EngineInner>,
}

impl SwrEngine {
    pub fn new(cache: Arc<CacheService>) -> Self {
        let (focus, _) = broadcast::channel(16);
        SwrEngine {
            inner: Arc::new(EngineInner {
                cache,
                registry: Mutex::new(Registry::default()),
                generation: AtomicU64::new(0),
                focus,
            }),
        }
    }

    /// Build the engine and its `CacheService` in one go.
    pub fn with_store(store: Arc<dyn Store>, config: CacheConfig) -> Self {
        Self::new(Arc::new(CacheService::new(store, config)))
    }

    pub fn cache(&self) -> &Arc<CacheService> {
        &self.inner.cache
    }

    /// Declare the signed-in user. See [`CacheService::set_owner`].
    pub async fn set_owner(&self, owner: Option<&str>) {
        self.inner.cache.set_owner(owner).await;
    }

    /// Forward a focus or visibility change to every subscription.
    pub fn notify_focus(&self, event: FocusEvent) {
        // No receivers just means no live subscriptions.
        let _ = self.inner.focus.send(event);
    }

    /// Whether a fetch for `key` is currently registered as in flight.
    pub fn is_fetching(&self, key: &CacheKey) -> bool {
        self.inner.registry().in_flight.contains_key(&key.id())
    }

    /// When the last real fetch for `key` was started.
    pub fn last_fetched_at(&self, key: &CacheKey) -> Option<Instant> {
        self.inner.registry().last_fetch.get(&key.id()).copied()
    }

    /// Subscribe to `key`.
    ///
    /// The cache is read before this returns, so a hit is already visible in
    /// [`Subscription::state`]. A fetch follows on a miss, or always with
    /// `revalidate_on_mount`; it runs in the background and publishes into
    /// the subscription when it settles.
    ///
    /// A `None` key yields an idle subscription: no cache read, no fetch.
    pub async fn subscribe<V, F, Fut>(
        &self,
        key: Option<CacheKey>,
        fetcher: F,
        options: SwrOptions,
    ) -> Subscription<V>
    where
        V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
        F: Fn(CacheKey) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let (state_tx, state_rx) = watch::channel(SwrState::default());
        let inner = Arc::new(SubscriptionInner {
            engine: self.clone(),
            key,
            fetcher: boxed_fetcher(fetcher),
            options,
            state: state_tx,
            loaded: AtomicBool::new(false),
            active: AtomicBool::new(true),
            pending: AtomicUsize::new(0),
        });
        let mut subscription = Subscription {
            inner: inner.clone(),
            state: state_rx,
            tasks: Vec::new(),
        };

        let Some(key) = inner.key.clone() else {
            return subscription;
        };

        let cached = self.inner.cache.get::<V>(&key).await;
        let hit = cached.is_some();
        if let Some(data) = cached {
            inner.loaded.store(true, Ordering::Release);
            inner.publish(|s| s.data = Some(data));
        }

        if inner.options.revalidate_on_mount || !hit {
            let pending = inner.begin(hit);
            // Detached: unsubscribing must not cancel the mount fetch.
            let task = inner.clone();
            tokio::spawn(async move {
                let _ = task.complete(&key, pending).await;
            });
        }

        if inner.options.revalidate_on_focus {
            let mut events = self.inner.focus.subscribe();
            let task = inner.clone();
            subscription.tasks.push(tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => {
                            if !task.loaded.load(Ordering::Acquire) {
                                continue;
                            }
                            debug!(key = ?task.key, ?event, "revalidating on focus");
                            let _ = task.run_fetch(true).await;
                        }
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
            }));
        }

        if let Some(period) = inner.options.revalidate_interval {
            let task = inner.clone();
            subscription.tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let background = task.loaded.load(Ordering::Acquire);
                    let _ = task.run_fetch(background).await;
                }
            }));
        }

        subscription
    }

    /// Warm the cache for `key` unless it already holds a valid entry.
    pub async fn prefetch<V, F, Fut>(&self, key: &CacheKey, fetcher: F) -> Result<(), FetchError>
    where
        V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
        F: Fn(CacheKey) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        if self.inner.cache.has_cache(key).await {
            debug!(key = %key, "prefetch skipped, already cached");
            return Ok(());
        }

        self.fetch(key, &boxed_fetcher(fetcher), DEFAULT_DEDUPING_INTERVAL)
            .await
            .map(|_| ())
    }

    /// Drop `key` from the cache and from both registries, or with `None`,
    /// everything.
    pub async fn clear_cache(&self, key: Option<&CacheKey>) {
        match key {
            Some(key) => {
                self.inner.cache.remove(key).await;
                let id = key.id();
                let mut registry = self.inner.registry();
                registry.in_flight.remove(&id);
                registry.last_fetch.remove(&id);
            }
            None => {
                self.inner.cache.clear_all().await;
                let mut registry = self.inner.registry();
                registry.in_flight.clear();
                registry.last_fetch.clear();
            }
        }
    }

    /// Run the fetcher for `key`, or join the fetch already running for it.
    ///
    /// A running fetch is joined only if it was started within
    /// `deduping_interval`. The fetch itself is driven by its own task, so
    /// it completes and populates the cache even if every caller goes away.
    async fn fetch<V>(
        &self,
        key: &CacheKey,
        fetcher: &Fetcher<V>,
        deduping_interval: Duration,
    ) -> Result<V, FetchError>
    where
        V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
    {
        let id = key.id();
        let fetch = {
            let mut registry = self.inner.registry();
            let now = Instant::now();
            let recent = registry
                .last_fetch
                .get(&id)
                .is_some_and(|started| now.duration_since(*started) < deduping_interval);
            let joined = registry
                .in_flight
                .get(&id)
                .filter(|_| recent)
                .map(|in_flight| in_flight.fetch.clone());

            match joined {
                Some(fetch) => {
                    debug!(key = %key, "joining in-flight fetch");
                    fetch
                }
                None => {
                    let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
                    let fetch =
                        self.start_fetch(id.clone(), generation, key.clone(), fetcher.clone());
                    registry.in_flight.insert(
                        id.clone(),
                        InFlight {
                            generation,
                            fetch: fetch.clone(),
                        },
                    );
                    registry.last_fetch.insert(id, now);
                    tokio::spawn(fetch.clone());
                    fetch
                }
            }
        };

        let value = fetch.await?;
        value.downcast::<V>().map(Arc::unwrap_or_clone).map_err(|_| {
            FetchError::msg(format!("fetch for '{}' resolved to a different type", key))
        })
    }

    fn start_fetch<V>(
        &self,
        id: String,
        generation: u64,
        key: CacheKey,
        fetcher: Fetcher<V>,
    ) -> SharedFetch
    where
        V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
    {
        let cache = self.inner.cache.clone();
        let engine: Weak<EngineInner> = Arc::downgrade(&self.inner);

        async move {
            debug!(key = %key, "fetching");
            let result = fetcher(key.clone()).await;

            match &result {
                Ok(value) => cache.set(&key, value).await,
                Err(e) => warn!(key = %key, error = %e, "fetch failed"),
            }

            if let Some(engine) = engine.upgrade() {
                let mut registry = engine.registry();
                let ours = registry
                    .in_flight
                    .get(&id)
                    .is_some_and(|in_flight| in_flight.generation == generation);
                if ours {
                    registry.in_flight.remove(&id);
                }
            }

            result.map(|value| Arc::new(value) as Erased)
        }
        .boxed()
        .shared()
    }
}

fn boxed_fetcher<V, F, Fut>(fetcher: F) -> Fetcher<V>
where
    F: Fn(CacheKey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
{
    Arc::new(move |key| fetcher(key).boxed())
}

struct SubscriptionInner<V> {
    engine: SwrEngine,
    key: Option<CacheKey>,
    fetcher: Fetcher<V>,
    options: SwrOptions,
    state: watch::Sender<SwrState<V>>,
    /// Data was shown at least once, from cache or network.
    loaded: AtomicBool,
    active: AtomicBool,
    /// Fetches started by this subscription that have not settled.
    pending: AtomicUsize,
}

impl<V> SubscriptionInner<V> {
    fn publish(&self, update: impl FnOnce(&mut SwrState<V>)) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        self.state.send_modify(update);
    }
}

/// One started fetch of a subscription, settled by [`Pending::settle`].
///
/// Dropped unsettled (the awaiting future was cancelled), it still takes the
/// fetch off the count and clears the loading flags if it was the last one.
struct Pending<V> {
    inner: Arc<SubscriptionInner<V>>,
    armed: bool,
}

impl<V> Pending<V> {
    /// Returns whether this was the last fetch still pending.
    fn settle(mut self) -> bool {
        self.armed = false;
        self.inner.pending.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

impl<V> Drop for Pending<V> {
    fn drop(&mut self) {
        if self.armed && self.inner.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.publish(|s| {
                s.is_validating = false;
                s.is_revalidating = false;
            });
        }
    }
}

impl<V> SubscriptionInner<V>
where
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// Mark a fetch as started. Background fetches never downgrade a
    /// running foreground load.
    fn begin(self: &Arc<Self>, background: bool) -> Pending<V> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.publish(|s| {
            s.error = None;
            if background && !s.is_validating {
                s.is_revalidating = true;
            } else {
                s.is_validating = true;
                s.is_revalidating = false;
            }
        });
        Pending {
            inner: self.clone(),
            armed: true,
        }
    }

    async fn complete(&self, key: &CacheKey, pending: Pending<V>) -> Result<V, FetchError> {
        let result = self
            .engine
            .fetch(key, &self.fetcher, self.options.deduping_interval)
            .await;
        let settled = pending.settle();

        match &result {
            Ok(value) => {
                self.loaded.store(true, Ordering::Release);
                self.publish(|s| {
                    s.data = Some(value.clone());
                    s.error = None;
                    if settled {
                        s.is_validating = false;
                        s.is_revalidating = false;
                    }
                });
            }
            Err(e) => {
                self.publish(|s| {
                    s.error = Some(e.clone());
                    if settled {
                        s.is_validating = false;
                        s.is_revalidating = false;
                    }
                });
            }
        }

        result
    }

    async fn run_fetch(self: &Arc<Self>, background: bool) -> Result<Option<V>, FetchError> {
        let Some(key) = &self.key else {
            return Ok(None);
        };
        let pending = self.begin(background);
        self.complete(key, pending).await.map(Some)
    }
}

/// A live binding of one key to one consumer.
///
/// Dropping the subscription (or calling [`unsubscribe`](Self::unsubscribe))
/// stops all state publication and its focus/interval tasks. Fetches it
/// started still run to completion and still populate the cache.
pub struct Subscription<V> {
    inner: Arc<SubscriptionInner<V>>,
    state: watch::Receiver<SwrState<V>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<V> Subscription<V>
where
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    pub fn key(&self) -> Option<&CacheKey> {
        self.inner.key.as_ref()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SwrState<V> {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn watch(&self) -> watch::Receiver<SwrState<V>> {
        self.state.clone()
    }

    /// Wait until the state satisfies `predicate` and return it.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SwrState<V>) -> bool,
    ) -> SwrState<V> {
        let mut state = self.state.clone();
        match state.wait_for(|s| predicate(s)).await {
            Ok(s) => (*s).clone(),
            Err(_) => self.state(),
        }
    }

    /// Fetch again: in background if data was loaded before, else as a
    /// foreground load. Returns `Ok(None)` for a subscription without key.
    pub async fn revalidate(&self) -> Result<Option<V>, FetchError> {
        let background = self.inner.loaded.load(Ordering::Acquire);
        self.inner.run_fetch(background).await
    }

    /// Show `data` right away and persist it in the background.
    ///
    /// The fetcher and the fetch registries are left alone, so a fetch that
    /// is already running may still replace `data` when it settles.
    pub fn mutate(&self, data: V) {
        let persisted = data.clone();
        self.inner.publish(|s| s.data = Some(data));

        if let Some(key) = self.inner.key.clone() {
            let cache = self.inner.engine.cache().clone();
            tokio::spawn(async move {
                cache.set(&key, &persisted).await;
            });
        }
    }

    pub fn unsubscribe(self) {}
}

impl<V> Drop for Subscription<V> {
    fn drop(&mut self) {
        self.inner.active.store(false, Ordering::Release);
        for task in &self.tasks {
            task.abort();
        }
    }
}
