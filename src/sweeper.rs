use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::engine::{BookingService, SweepOutcome};
use crate::store::InMemoryStore;

/// One tick of the expiry sweeper. Returns the timestamp to pass next time.
pub async fn sweep_tick(
    service: &BookingService,
    last_sweep: Option<NaiveDateTime>,
) -> Option<NaiveDateTime> {
    match service.sweep_expired(last_sweep).await {
        Ok(SweepOutcome::Swept { completed, at }) => {
            if completed > 0 {
                info!("completed {completed} expired booking(s)");
            }
            Some(at)
        }
        Ok(SweepOutcome::Skipped { .. }) => last_sweep,
        Err(e) => {
            // Storage hiccup; try again next tick.
            warn!("expiry sweep failed: {e}");
            last_sweep
        }
    }
}

/// Background task that periodically completes expired approved bookings.
pub async fn run_sweeper(service: Arc<BookingService>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    let mut last_sweep = None;
    loop {
        interval.tick().await;
        last_sweep = sweep_tick(&service, last_sweep).await;
    }
}

/// Background task that compacts the WAL once enough appends pile up.
pub async fn run_compactor(store: Arc<InMemoryStore>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        if store.appends_since_compact().await < threshold {
            continue;
        }
        match store.compact().await {
            Ok(kept) => {
                metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
                info!("compacted WAL to {kept} reservation(s)");
            }
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}
