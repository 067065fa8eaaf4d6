// src/driver/fixture.rs
//! In-memory driver serving canned pages to tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{DriverError, PageDriver};

#[derive(Debug, Default)]
pub struct FixtureDriver {
    // Each read of page_source() advances through the snapshots and then
    // sticks on the last one, mimicking script-populated pages.
    pages: HashMap<String, Vec<String>>,
    timeouts: Vec<String>,
    current: Option<(String, usize)>,
    stop_calls: usize,
    source_reads: usize,
    quit: Arc<AtomicBool>,
}

impl FixtureDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.with_snapshots(url, &[html])
    }

    pub fn with_snapshots(mut self, url: &str, snapshots: &[&str]) -> Self {
        self.pages.insert(
            url.to_string(),
            snapshots.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Navigating to `url` reports a page-load timeout.
    pub fn with_timeout(mut self, url: &str) -> Self {
        self.timeouts.push(url.to_string());
        self
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls
    }

    pub fn source_reads(&self) -> usize {
        self.source_reads
    }

    /// Flag flipped by `quit()`; shareable after the driver is boxed away.
    pub fn quit_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.quit)
    }
}

#[async_trait::async_trait]
impl PageDriver for FixtureDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.current = None;
        if self.timeouts.iter().any(|u| u == url) {
            return Err(DriverError::Timeout(Duration::from_secs(30)));
        }
        if !self.pages.contains_key(url) {
            return Err(DriverError::Navigation(format!("no fixture for {url}")));
        }
        self.current = Some((url.to_string(), 0));
        Ok(())
    }

    async fn stop_loading(&mut self) -> Result<(), DriverError> {
        self.stop_calls += 1;
        if self.current.is_none() {
            self.current = Some((String::new(), 0));
        }
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, DriverError> {
        self.source_reads += 1;
        let (url, idx) = self.current.as_mut().ok_or(DriverError::NoPage)?;
        let Some(snaps) = self.pages.get(url.as_str()) else {
            return Ok(String::new());
        };
        let html = snaps
            .get(*idx)
            .or_else(|| snaps.last())
            .cloned()
            .unwrap_or_default();
        *idx += 1;
        Ok(html)
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        self.quit.store(true, Ordering::SeqCst);
        Ok(())
    }
}
