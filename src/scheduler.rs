// src/scheduler.rs
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::cycle::{run_cycle, CycleContext, FatalError, Sinks};
use crate::extract::ListingSource;
use crate::store::SeenStore;

/// Run a cycle every `period` (first one a full period after start) until
/// `shutdown` resolves or a cycle fails fatally.
///
/// Cycles never overlap: a tick that arrives while a cycle is still running
/// waits for it. Shutdown is honoured mid-cycle too; the abandoned cycle
/// saves nothing, so alerts it already sent may repeat after a restart.
/// Either way out, the driver is released before returning.
pub async fn run_scheduler(
    ctx: &mut CycleContext,
    sources: &[Box<dyn ListingSource>],
    store: &SeenStore,
    sinks: &Sinks<'_>,
    period: Duration,
    shutdown: impl Future<Output = ()>,
) -> Result<(), FatalError> {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!(cycles = ctx.index, "shutdown requested");
                break Ok(());
            }
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            _ = &mut shutdown => {
                tracing::info!(index = ctx.index, "shutdown requested mid-cycle, abandoning it");
                break Ok(());
            }
            r = run_cycle(ctx, sources, store, sinks) => r,
        };

        match outcome {
            Ok(_) => ctx.index += 1,
            Err(e) => {
                tracing::error!(index = ctx.index, error = %e, "❌ Error in scheduled job");
                break Err(e);
            }
        }
    };

    if let Err(e) = ctx.driver.quit().await {
        tracing::warn!(error = %e, "driver quit failed");
    }
    result
}
