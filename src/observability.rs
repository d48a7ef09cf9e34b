use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking operations. Labels: op, status.
pub const BOOKING_OPS_TOTAL: &str = "hallbook_booking_ops_total";

/// Histogram: availability check latency in seconds.
pub const AVAILABILITY_CHECK_SECONDS: &str = "hallbook_availability_check_seconds";

/// Counter: availability checks that found a conflict.
pub const CONFLICTS_TOTAL: &str = "hallbook_conflicts_total";

/// Histogram: suggestions offered per conflicting check.
pub const SUGGESTIONS_OFFERED: &str = "hallbook_suggestions_offered";

// ── Background work ─────────────────────────────────────────────

/// Counter: approved bookings moved to completed by the sweeper.
pub const SWEEP_COMPLETED_TOTAL: &str = "hallbook_sweep_completed_total";

/// Counter: sweeps skipped by the throttle.
pub const SWEEP_SKIPPED_TOTAL: &str = "hallbook_sweep_skipped_total";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "hallbook_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
