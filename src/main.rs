use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use hallbook::clock::SystemClock;
use hallbook::config::Config;
use hallbook::engine::BookingService;
use hallbook::notify::NotifyHub;
use hallbook::store::InMemoryStore;
use hallbook::sweeper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    hallbook::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(InMemoryStore::open(&config.wal_path())?);
    let hub = Arc::new(NotifyHub::new());
    let service = Arc::new(BookingService::new(
        store.clone(),
        Arc::new(SystemClock),
        hub.clone(),
        config.policy.clone(),
    ));

    info!("hallbook started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  reservations restored: {}", store.len());
    info!("  buffer: {} min", config.policy.buffer_minutes);
    info!("  sweep every: {:?}", config.sweep_interval);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    tokio::spawn(sweeper::run_sweeper(service.clone(), config.sweep_interval));
    tokio::spawn(sweeper::run_compactor(store.clone(), config.compact_threshold));

    // Event tap for mail/push senders reading the log stream.
    let mut events = hub.subscribe_all();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(target: "hallbook::events", "{}", event.payload()),
                Err(RecvError::Lagged(n)) => tracing::warn!("event tap lagged by {n}"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    shutdown_signal().await;
    info!("shutdown signal received");

    match store.compact().await {
        Ok(kept) => info!("final compaction kept {kept} reservation(s)"),
        Err(e) => tracing::warn!("final compaction failed: {e}"),
    }
    info!("hallbook stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("no SIGTERM handler: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
