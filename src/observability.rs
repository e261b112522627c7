use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;

use crate::scheduler::Trigger;

// ── Convergence runs ────────────────────────────────────────────

/// Counter: convergence runs started. Labels: trigger.
pub const CONVERGE_RUNS_TOTAL: &str = "reeltime_converge_runs_total";

/// Histogram: wall time of one fetch → resolve → persist → refetch run.
pub const CONVERGE_DURATION_SECONDS: &str = "reeltime_converge_duration_seconds";

/// Counter: status diffs sent to the backend. Labels: status (ok | error).
pub const STATUS_UPDATES_TOTAL: &str = "reeltime_status_updates_total";

/// Counter: triggers folded into an already queued run.
pub const TRIGGERS_COALESCED_TOTAL: &str = "reeltime_triggers_coalesced_total";

/// Counter: snapshots dropped because a newer read was already published.
pub const STALE_SNAPSHOTS_TOTAL: &str = "reeltime_stale_snapshots_total";

// ── Price list timeline ─────────────────────────────────────────

/// Gauge: number of uncovered ranges in the last gap report.
pub const PRICE_LIST_GAPS: &str = "reeltime_price_list_gaps";

/// Counter: price list writes. Labels: op, status.
pub const PRICE_LIST_WRITES_TOTAL: &str = "reeltime_price_list_writes_total";

// ── Local store journal ─────────────────────────────────────────

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "reeltime_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "reeltime_journal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

pub fn trigger_label(trigger: Trigger) -> &'static str {
    match trigger {
        Trigger::Timer => "timer",
        Trigger::FocusRegained => "focus",
        Trigger::Navigation => "navigation",
        Trigger::Manual => "manual",
    }
}

pub fn result_label<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() { "ok" } else { "error" }
}
