// src/extract/mod.rs
pub mod crowdworks;
pub mod lancers;

use anyhow::Result;
use metrics::counter;
use serde::Deserialize;
use std::time::Duration;

use crate::driver::{DriverError, PageDriver};
use crate::listing::Listing;

pub use crowdworks::CrowdWorksSource;
pub use lancers::LancersSource;

/// Which marketplace a configured search URL belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marketplace {
    Lancers,
    Crowdworks,
}

/// One polled search page: a tag for alerts/rows and the URL to load.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    pub tag: String,
    pub url: String,
    pub marketplace: Marketplace,
}

impl SourceConfig {
    pub fn new(tag: &str, url: &str, marketplace: Marketplace) -> Self {
        Self {
            tag: tag.to_string(),
            url: url.to_string(),
            marketplace,
        }
    }
}

/// Bounded polling for content that shows up after the initial load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub attempts: u32,
    pub delay: Duration,
}

impl Readiness {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Single check, no waiting. Handy for fixtures.
    pub const fn immediate() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

#[async_trait::async_trait]
pub trait ListingSource: Send + Sync {
    fn tag(&self) -> &str;

    /// Load the search page and pull listings out of it. An `Err` means the
    /// whole source failed for this cycle; bad individual entries are skipped
    /// internally.
    async fn fetch_listings(&self, driver: &mut dyn PageDriver) -> Result<Vec<Listing>>;
}

pub fn build_sources(configs: &[SourceConfig]) -> Vec<Box<dyn ListingSource>> {
    configs
        .iter()
        .map(|c| -> Box<dyn ListingSource> {
            match c.marketplace {
                Marketplace::Lancers => Box::new(LancersSource::new(&c.tag, &c.url)),
                Marketplace::Crowdworks => Box::new(CrowdWorksSource::new(&c.tag, &c.url)),
            }
        })
        .collect()
}

/// Navigate to `url`. A timeout is not fatal: the in-flight load is stopped
/// and the caller works with whatever made it into the page.
pub(crate) async fn open_page(
    driver: &mut dyn PageDriver,
    url: &str,
    tag: &str,
) -> Result<(), DriverError> {
    match driver.navigate(url).await {
        Ok(()) => Ok(()),
        Err(DriverError::Timeout(after)) => {
            tracing::warn!(
                source = tag,
                ?after,
                "⚠️ Job list page load exceeded timeout, proceeding by stopping load."
            );
            counter!("cycle_page_timeouts_total").increment(1);
            driver.stop_loading().await
        }
        Err(e) => Err(e),
    }
}

/// Re-read the document until `check` yields something or attempts run out.
pub(crate) async fn poll_document<T: Send>(
    driver: &mut dyn PageDriver,
    readiness: Readiness,
    check: impl Fn(&str) -> Option<T> + Send,
) -> Option<T> {
    for attempt in 1..=readiness.attempts.max(1) {
        match driver.page_source().await {
            Ok(html) => {
                if let Some(found) = check(&html) {
                    return Some(found);
                }
            }
            Err(e) => tracing::debug!(attempt, error = %e, "page source unavailable"),
        }
        if attempt < readiness.attempts {
            tokio::time::sleep(readiness.delay).await;
        }
    }
    None
}
