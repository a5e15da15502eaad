//! A personal finance dashboard fed through one SwrEngine.
//!
//! Shows the cache painting before the network, shared fetches between
//! widgets, optimistic updates, focus revalidation, prefetching the next
//! month and the owner sweep on sign-out.
//!
//! Run with `RUST_LOG=swr_vault=debug` to watch the engine decide.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use swr_vault::{
    CacheConfig, CacheKey, FetchError, FocusEvent, MokaStore, MokaStoreConfig, SwrEngine,
    SwrOptions,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Expense {
    id: u64,
    amount: u64,
    note: String,
}

/// Stand-in for the remote API.
#[derive(Clone, Default)]
struct Api {
    requests: Arc<AtomicUsize>,
}

impl Api {
    async fn expenses(&self, key: CacheKey) -> Result<Vec<Expense>, FetchError> {
        let n = self.requests.fetch_add(1, Ordering::SeqCst) as u64;
        println!("  -> GET /expenses owner={} month={:?}", key.owner(), key.suffix());
        tokio::time::sleep(Duration::from_millis(150)).await;
        Ok(vec![
            Expense {
                id: 1,
                amount: 100,
                note: "groceries".to_string(),
            },
            Expense {
                id: 2,
                amount: 40 + n,
                note: "transport".to_string(),
            },
        ])
    }

    fn fetcher(
        &self,
    ) -> impl Fn(CacheKey) -> futures::future::BoxFuture<'static, Result<Vec<Expense>, FetchError>>
    + Send
    + Sync
    + 'static {
        let api = self.clone();
        move |key| {
            let api = api.clone();
            Box::pin(async move { api.expenses(key).await })
        }
    }
}

fn total(expenses: &Option<Vec<Expense>>) -> u64 {
    expenses
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|e| e.amount)
        .sum()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("swr_vault=info,warn")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = Arc::new(MokaStore::new(MokaStoreConfig::default()));
    let engine = SwrEngine::with_store(store, CacheConfig::default());
    let api = Api::default();

    println!("== sign in as user1");
    engine.set_owner(Some("user1")).await;
    let may: CacheKey = "gastos-user1-2024-05".parse()?;

    // Two widgets mount together; only one request goes out.
    let summary = engine
        .subscribe(Some(may.clone()), api.fetcher(), SwrOptions::default())
        .await;
    let chart = engine
        .subscribe(Some(may.clone()), api.fetcher(), SwrOptions::default())
        .await;
    println!("summary loading: {}", summary.state().is_validating);

    let state = summary.wait_for(|s| !s.is_loading()).await;
    chart.wait_for(|s| s.data.is_some()).await;
    println!(
        "summary total {} after {} request(s)",
        total(&state.data),
        api.requests.load(Ordering::SeqCst)
    );

    println!("== optimistic add");
    let mut rows = state.data.unwrap_or_default();
    rows.push(Expense {
        id: 3,
        amount: 25,
        note: "coffee".to_string(),
    });
    summary.mutate(rows);
    println!("summary total {} (not yet confirmed)", total(&summary.state().data));

    println!("== prefetch next month");
    let june = CacheKey::with_suffix("gastos", "user1", "2024-06");
    engine.prefetch(&june, api.fetcher()).await?;
    println!("june cached: {}", engine.cache().has_cache(&june).await);

    println!("== user comes back to the tab");
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    engine.notify_focus(FocusEvent::WindowFocus);
    summary.wait_for(|s| s.is_revalidating).await;
    let refreshed = summary.wait_for(|s| !s.is_loading()).await;
    println!(
        "summary total {} after {} request(s)",
        total(&refreshed.data),
        api.requests.load(Ordering::SeqCst)
    );

    println!("== remount paints from cache");
    drop(chart);
    let remount = engine
        .subscribe(
            Some(may.clone()),
            api.fetcher(),
            SwrOptions {
                revalidate_on_mount: true,
                ..Default::default()
            },
        )
        .await;
    let painted = remount.state();
    println!(
        "painted total {} (revalidating: {})",
        total(&painted.data),
        painted.is_revalidating
    );
    remount.wait_for(|s| !s.is_loading()).await;

    println!("== switch to user2 and back");
    drop(summary);
    drop(remount);
    engine.set_owner(Some("user2")).await;
    engine.set_owner(Some("user1")).await;
    println!(
        "user1's may still cached: {}",
        engine.cache().has_cache(&may).await
    );

    engine.clear_cache(None).await;
    println!("done, {} request(s) total", api.requests.load(Ordering::SeqCst));

    Ok(())
}
