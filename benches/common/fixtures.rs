use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use swr_vault::{CacheKey, FetchError};

/// One expense row, as the backend would send it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: u64,
    pub amount: u64,
    pub category: String,
}

impl Expense {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            amount: (id * 37) % 10_000,
            category: format!("category-{}", id % 12),
        }
    }
}

/// Simulated backend API with configurable latency
#[derive(Clone)]
pub struct FakeApi {
    rows_per_month: u64,
    latency_ms: u64,
    request_count: Arc<AtomicUsize>,
}

impl FakeApi {
    pub fn new(rows_per_month: u64, latency_ms: u64) -> Self {
        Self {
            rows_per_month,
            latency_ms,
            request_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn expenses(&self, key: CacheKey) -> Result<Vec<Expense>, FetchError> {
        self.request_count.fetch_add(1, Ordering::Relaxed);

        // Simulate network latency
        tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;

        let seed = key.suffix().map(str::len).unwrap_or_default() as u64;
        Ok((0..self.rows_per_month).map(|i| Expense::new(seed * 1_000 + i)).collect())
    }

    #[allow(dead_code)]
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    #[allow(dead_code)]
    pub fn reset_count(&self) {
        self.request_count.store(0, Ordering::Relaxed);
    }
}

/// Generate cache keys for different workload patterns
pub struct KeyGenerator {
    owner: String,
    num_keys: usize,
}

impl KeyGenerator {
    pub fn new(owner: &str, num_keys: usize) -> Self {
        Self {
            owner: owner.to_string(),
            num_keys,
        }
    }

    fn key(&self, i: usize) -> CacheKey {
        CacheKey::with_suffix("gastos", self.owner.as_str(), format!("month-{}", i))
    }

    /// Every key once, in order (for cold cache tests)
    pub fn sequential(&self) -> Vec<CacheKey> {
        (0..self.num_keys).map(|i| self.key(i)).collect()
    }

    /// Keys where `hit_ratio` of the requests land on the first few
    /// (prepopulated) keys and the rest stride across the whole range.
    pub fn mixed(&self, hit_ratio: f64, count: usize) -> Vec<CacheKey> {
        let hot = ((self.num_keys as f64 * hit_ratio) as usize).max(1);
        let every = ((1.0 / (1.0 - hit_ratio).max(0.01)) as usize).max(1);

        (0..count)
            .map(|i| {
                if i % every == every - 1 {
                    self.key(hot + (i * 7) % (self.num_keys * 4))
                } else {
                    self.key((i * 13) % hot)
                }
            })
            .collect()
    }
}
