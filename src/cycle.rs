// src/cycle.rs
//! One poll → extract → dedup → notify → persist pass across all sources.

use metrics::{counter, gauge};
use std::collections::HashSet;

use crate::driver::PageDriver;
use crate::extract::ListingSource;
use crate::listing::{ExportRow, Listing, SeenRecord, TIME_FORMAT};
use crate::notify::{notify_best_effort, NewJobAlert, Notifier};
use crate::sheets::{export_best_effort, SheetSink};
use crate::store::SeenStore;
use crate::telemetry::ensure_metrics_described;
use crate::translate::{translate_title, Translator};

/// What the scheduler hands every cycle: the one shared driver plus a
/// running count of completed cycles.
pub struct CycleContext {
    pub driver: Box<dyn PageDriver>,
    pub index: u64,
}

impl CycleContext {
    pub fn new(driver: Box<dyn PageDriver>) -> Self {
        Self { driver, index: 0 }
    }
}

/// Outbound collaborators used while processing new listings.
pub struct Sinks<'a> {
    pub notifier: &'a dyn Notifier,
    pub sheet: &'a dyn SheetSink,
    pub translator: &'a dyn Translator,
}

/// Errors that must stop the process.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("persisting seen set failed: {0:#}")]
    Persist(anyhow::Error),
    #[error("startup failed: {0:#}")]
    Startup(anyhow::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub new: usize,
    pub source_errors: usize,
    pub notify_failures: usize,
}

pub fn now_display() -> String {
    chrono::Local::now().format(TIME_FORMAT).to_string()
}

/// Run every source against the shared driver and concatenate the results
/// in source order. A failing source is logged and contributes nothing.
pub async fn collect_listings(
    driver: &mut dyn PageDriver,
    sources: &[Box<dyn ListingSource>],
) -> (Vec<Listing>, usize) {
    let mut batch = Vec::new();
    let mut errors = 0usize;
    for src in sources {
        match src.fetch_listings(driver).await {
            Ok(mut v) => batch.append(&mut v),
            Err(e) => {
                tracing::warn!(source = src.tag(), error = %format!("{e:#}"), "⚠️ Error fetching jobs");
                counter!("cycle_source_errors_total").increment(1);
                errors += 1;
            }
        }
    }
    (batch, errors)
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub export: Vec<ExportRow>,
    pub notify_failures: usize,
}

/// Walk the batch in order, surfacing each id at most once.
///
/// `seen` is appended to in place; persisting it is the caller's job.
pub async fn dedup_and_notify(
    seen: &mut Vec<SeenRecord>,
    batch: Vec<Listing>,
    sinks: &Sinks<'_>,
) -> BatchOutcome {
    let known: HashSet<String> = seen.iter().map(|r| r.id.clone()).collect();
    let mut added: HashSet<String> = HashSet::new();
    let mut out = BatchOutcome::default();

    for mut listing in batch {
        if known.contains(&listing.id) || added.contains(&listing.id) {
            continue;
        }

        listing.title = translate_title(sinks.translator, &listing.title).await;
        let time = now_display();

        tracing::info!(
            source = %listing.source_tag,
            id = %listing.id,
            kind = %listing.kind,
            price = %listing.price,
            title = %listing.title,
            url = %listing.url,
            "✨NEW JOB✨"
        );

        let alert = NewJobAlert::from_listing(&listing, &time);
        if !notify_best_effort(sinks.notifier, &alert).await {
            out.notify_failures += 1;
        }

        out.export.push(ExportRow::from_listing(&listing, &time));
        seen.push(SeenRecord::from_listing(&listing, &time));
        added.insert(listing.id);
    }
    out
}

/// One full cycle. Only a failure to persist the seen set is fatal;
/// everything else is logged and absorbed.
pub async fn run_cycle(
    ctx: &mut CycleContext,
    sources: &[Box<dyn ListingSource>],
    store: &SeenStore,
    sinks: &Sinks<'_>,
) -> Result<CycleReport, FatalError> {
    ensure_metrics_described();
    tracing::info!(index = ctx.index, "Checking for new jobs...");

    let mut seen = store.load().await;
    let (batch, source_errors) = collect_listings(ctx.driver.as_mut(), sources).await;
    let fetched = batch.len();

    let outcome = dedup_and_notify(&mut seen, batch, sinks).await;

    store.save(&seen).await.map_err(FatalError::Persist)?;

    if outcome.export.is_empty() {
        tracing::info!("No new jobs to update in Google Sheets.");
    } else {
        export_best_effort(sinks.sheet, &outcome.export).await;
    }

    let report = CycleReport {
        fetched,
        new: outcome.export.len(),
        source_errors,
        notify_failures: outcome.notify_failures,
    };

    counter!("cycle_runs_total").increment(1);
    counter!("cycle_listings_total").increment(fetched as u64);
    counter!("cycle_new_total").increment(report.new as u64);
    gauge!("cycle_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

    tracing::info!(
        index = ctx.index,
        fetched = report.fetched,
        new = report.new,
        source_errors = report.source_errors,
        "checked"
    );
    Ok(report)
}
