//! Concurrent price prefetching.
//!
//! All slow lookups for a request are issued up front on the blocking pool,
//! each bounded by a timeout. The synchronous pipeline then runs against the
//! in-memory result.

use crate::market_data::{InMemoryPriceSource, PriceRequest, PriceSeries, PriceSeriesSource};
use futures::future::join_all;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetch every request concurrently. A timeout or failure leaves that request
/// without data; it never fails the batch.
pub async fn prefetch_prices(
    source: Arc<dyn PriceSeriesSource>,
    requests: Vec<PriceRequest>,
    fetch_timeout: Duration,
) -> InMemoryPriceSource {
    let total = requests.len();
    let tasks = requests.into_iter().map(|request| {
        let source = Arc::clone(&source);
        async move { fetch_one(source, request, fetch_timeout).await }
    });

    let results = join_all(tasks).await;
    let store = InMemoryPriceSource::new();
    let mut fetched = 0;
    for series in results.into_iter().flatten() {
        fetched += 1;
        store.merge(series);
    }
    info!("Prefetched {}/{} price requests", fetched, total);
    store
}

async fn fetch_one(
    source: Arc<dyn PriceSeriesSource>,
    request: PriceRequest,
    fetch_timeout: Duration,
) -> Option<PriceSeries> {
    let label = format!("{} {}..{}", request.ticker, request.start, request.end);
    let handle = tokio::task::spawn_blocking(move || {
        source.get_adjusted_prices(&request.ticker, request.start, request.end)
    });

    match timeout(fetch_timeout, handle).await {
        Ok(Ok(Ok(series))) => Some(series),
        Ok(Ok(Err(e))) => {
            warn!("Price fetch for {} failed: {}", label, e);
            None
        }
        Ok(Err(join_error)) => {
            warn!("Price fetch task for {} aborted: {}", label, join_error);
            None
        }
        Err(_) => {
            warn!("Price fetch for {} timed out after {:?}", label, fetch_timeout);
            None
        }
    }
}
