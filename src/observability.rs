use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: assignment operations. Labels: op, outcome.
pub const OPERATIONS_TOTAL: &str = "roomkeep_operations_total";

/// Histogram: assignment operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "roomkeep_operation_duration_seconds";

/// Counter: commits that lost a version race and were retried.
pub const COMMIT_RETRIES_TOTAL: &str = "roomkeep_commit_retries_total";

/// Counter: operations that ran out of commit attempts.
pub const COMMIT_CONFLICTS_TOTAL: &str = "roomkeep_commit_conflicts_total";

// ── Consistency ─────────────────────────────────────────────────

/// Counter: occupant room references rewritten by reconciliation.
pub const RECONCILE_REPAIRS_TOTAL: &str = "roomkeep_reconcile_repairs_total";

/// Gauge: occupants whose directory reference is known to be stale.
pub const PENDING_RECONCILIATIONS: &str = "roomkeep_pending_reconciliations";

// ── WAL ─────────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomkeep_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomkeep_wal_flush_batch_size";

/// Install a fmt subscriber. Safe to call more than once.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().try_init();
}

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
