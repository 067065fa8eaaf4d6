//! gig-watcher — binary entrypoint.
//! Logs in once, then polls the configured job searches every interval until
//! Ctrl-C (exit 0) or a fatal cycle error (exit 1).

use anyhow::Context;
use gig_watcher::{
    config::{load_sources_default, AppConfig},
    cycle::{CycleContext, FatalError, Sinks},
    driver::{HttpDriver, PageDriver},
    extract::build_sources,
    notify::SlackNotifier,
    scheduler::run_scheduler,
    sheets::GoogleSheetsSink,
    store::SeenStore,
    telemetry,
    translate::GoogleTranslator,
};

#[tokio::main]
async fn main() {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "❌ Critical error in main");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), FatalError> {
    let cfg = AppConfig::from_env().map_err(FatalError::Startup)?;
    let sources = load_sources_default()
        .map(|c| build_sources(&c))
        .map_err(FatalError::Startup)?;
    tracing::info!(sources = sources.len(), interval = ?cfg.check_interval, "starting");

    if let Some(addr) = cfg.metrics_addr {
        telemetry::install_prometheus(addr).map_err(FatalError::Startup)?;
    }

    let store = SeenStore::new(&cfg.seen_path);
    store.ensure_exists().await.map_err(FatalError::Startup)?;

    let mut driver = HttpDriver::new(
        cfg.page_load_timeout,
        cfg.proxy.as_ref(),
        cfg.accept_invalid_certs,
    )
    .map_err(FatalError::Startup)?;
    if let Err(e) = driver.login(&cfg.credentials).await {
        let _ = driver.quit().await;
        return Err(FatalError::Startup(anyhow::Error::new(e).context("logging in")));
    }

    let notifier = SlackNotifier::from_url(cfg.slack_webhook_url.clone());
    if !notifier.is_enabled() {
        tracing::warn!("SLACK_WEBHOOK_URL is not set; alerts go to the log only");
    }
    let sheet = GoogleSheetsSink::new(&cfg.google_credentials_path, cfg.google_sheet_url.clone());
    let translator = GoogleTranslator::new();
    let sinks = Sinks {
        notifier: &notifier,
        sheet: &sheet,
        translator: &translator,
    };

    let mut ctx = CycleContext::new(Box::new(driver));
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await.context("listening for ctrl-c") {
            tracing::warn!(error = %format!("{e:#}"), "no signal handler; running until a fatal error");
            std::future::pending::<()>().await;
        }
    };

    run_scheduler(&mut ctx, &sources, &store, &sinks, cfg.check_interval, shutdown).await
}
