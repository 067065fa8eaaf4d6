// src/notify/mod.rs
pub mod slack;

use anyhow::Result;

use crate::listing::Listing;

pub use slack::SlackNotifier;

/// One "new job" alert. Carries the display timestamp so the message, the
/// sheet row and the seen record all agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJobAlert {
    pub time: String,
    pub source_tag: String,
    pub price: String,
    pub title: String,
    pub url: String,
}

impl NewJobAlert {
    pub fn from_listing(listing: &Listing, time: &str) -> Self {
        Self {
            time: time.to_string(),
            source_tag: listing.source_tag.clone(),
            price: listing.price.clone(),
            title: listing.title.clone(),
            url: listing.url.clone(),
        }
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &NewJobAlert) -> Result<()>;
}

/// Send and log; never propagate. The cycle must keep going regardless.
pub async fn notify_best_effort(notifier: &dyn Notifier, alert: &NewJobAlert) -> bool {
    match notifier.send(alert).await {
        Ok(()) => {
            tracing::info!(source = %alert.source_tag, url = %alert.url, "✅ Slack notification sent successfully");
            true
        }
        Err(e) => {
            tracing::error!(source = %alert.source_tag, error = %format!("{e:#}"), "❌ Slack notification failed");
            metrics::counter!("notify_failures_total").increment(1);
            false
        }
    }
}

/// Records alerts in memory; optionally fails every send.
#[derive(Default)]
pub struct MockNotifier {
    pub sent: std::sync::Mutex<Vec<NewJobAlert>>,
    pub fail: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<NewJobAlert> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, alert: &NewJobAlert) -> Result<()> {
        if let Ok(mut v) = self.sent.lock() {
            v.push(alert.clone());
        }
        if self.fail {
            anyhow::bail!("mock notifier configured to fail");
        }
        Ok(())
    }
}
