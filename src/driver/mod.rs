// src/driver/mod.rs
//! Page driver seam. Extractors only need to navigate, stop a slow load and
//! read back the current document; everything else is the driver's business.

pub mod fixture;
pub mod http;

use std::time::Duration;

pub use fixture::FixtureDriver;
pub use http::{HttpDriver, ProxySettings};

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("page load timed out after {0:?}")]
    Timeout(Duration),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("no page loaded")]
    NoPage,
    #[error("login failed: {0}")]
    Login(String),
}

#[async_trait::async_trait]
pub trait PageDriver: Send {
    /// Load `url`, replacing the current document.
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// Abort an in-flight load and keep whatever arrived.
    async fn stop_loading(&mut self) -> Result<(), DriverError>;

    /// Current document markup.
    async fn page_source(&mut self) -> Result<String, DriverError>;

    /// Release the underlying resource. Further calls may fail.
    async fn quit(&mut self) -> Result<(), DriverError>;
}

/// Credentials for the marketplace account session.
#[derive(Clone, Default)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}
