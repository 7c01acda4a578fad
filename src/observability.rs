use std::net::SocketAddr;

use crate::engine::EngineError;

/// Counter: booking commits. Labels: status (`ok` or an error kind).
pub const COMMITS_TOTAL: &str = "innkeep_commits_total";

/// Counter: failed engine operations. Labels: operation, kind.
pub const OPERATION_ERRORS_TOTAL: &str = "innkeep_operation_errors_total";

/// Counter: per-room calendar edit sets committed.
pub const CALENDAR_EDITS_TOTAL: &str = "innkeep_calendar_edits_total";

/// Counter: reservations deleted together with their interval.
pub const RESERVATIONS_DELETED_TOTAL: &str = "innkeep_reservations_deleted_total";

/// Histogram: availability search latency in seconds. Labels: scope (`all`, `room`).
pub const SEARCH_DURATION_SECONDS: &str = "innkeep_search_duration_seconds";

/// Gauge: configured rooms.
pub const ROOMS: &str = "innkeep_rooms";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "innkeep_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "innkeep_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if `port` is `None`.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

pub fn record_error(operation: &'static str, err: &EngineError) {
    metrics::counter!(
        OPERATION_ERRORS_TOTAL,
        "operation" => operation,
        "kind" => err.kind().as_str()
    )
    .increment(1);
}
