// src/telemetry.rs
use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("cycle_runs_total", "Completed poll cycles.");
        describe_counter!(
            "cycle_listings_total",
            "Listings extracted across all sources."
        );
        describe_counter!("cycle_new_total", "Listings seen for the first time.");
        describe_counter!(
            "cycle_source_errors_total",
            "Sources that failed for a whole cycle."
        );
        describe_counter!(
            "cycle_entry_errors_total",
            "Individual entries skipped as unparsable."
        );
        describe_counter!(
            "cycle_page_timeouts_total",
            "Search page loads stopped after timing out."
        );
        describe_counter!("notify_failures_total", "Slack alerts that did not go out.");
        describe_counter!("sheet_failures_total", "Failed Google Sheets appends.");
        describe_gauge!("cycle_last_run_ts", "Unix ts when the last cycle finished.");
    });
}

/// Serve Prometheus metrics on `addr` (`GET /metrics`).
pub fn install_prometheus(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("prometheus: install recorder")?;
    ensure_metrics_described();
    tracing::info!(%addr, "metrics exporter listening");
    Ok(())
}

/// Compact fmt logs filtered by `RUST_LOG` (default: our crate at info).
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gig_watcher=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}
