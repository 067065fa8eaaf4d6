// src/sheets.rs
//! Google Sheets export: appends one row per new job to the first sheet.

use anyhow::{anyhow, Context, Result};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::listing::ExportRow;

pub const DEFAULT_CREDENTIALS_PATH: &str = "service_account.json";
const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

static RE_SHEET_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/spreadsheets/d/([A-Za-z0-9_-]+)").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended(usize),
    Skipped(&'static str),
}

#[async_trait::async_trait]
pub trait SheetSink: Send + Sync {
    async fn append_rows(&self, rows: &[ExportRow]) -> Result<AppendOutcome>;
}

/// Hand rows to the sink and log the result. Failures stay here.
pub async fn export_best_effort(sink: &dyn SheetSink, rows: &[ExportRow]) {
    tracing::info!(rows = rows.len(), "Updating Google Sheets with new jobs...");
    match sink.append_rows(rows).await {
        Ok(AppendOutcome::Appended(n)) => {
            tracing::info!(rows = n, "✅ Data successfully sent to Google Sheets.")
        }
        Ok(AppendOutcome::Skipped(why)) => {
            tracing::warn!(reason = why, "⚠️ Google Sheets export skipped")
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "❌ Failed to update Google Sheets");
            metrics::counter!("sheet_failures_total").increment(1);
        }
    }
}

/// Accepts a full sheet URL or a bare spreadsheet id.
pub fn spreadsheet_id(sheet: &str) -> Option<String> {
    let sheet = sheet.trim();
    if let Some(c) = RE_SHEET_ID.captures(sheet) {
        return Some(c[1].to_string());
    }
    let bare = !sheet.is_empty()
        && sheet
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    bare.then(|| sheet.to_string())
}

#[derive(Debug, Deserialize)]
struct ServiceAccount {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
struct AppendBody {
    values: Vec<Vec<String>>,
}

pub struct GoogleSheetsSink {
    client: Client,
    credentials_path: PathBuf,
    sheet_url: Option<String>,
    api_base: String,
    token: Mutex<Option<(String, Instant)>>,
}

impl GoogleSheetsSink {
    pub fn new(credentials_path: impl Into<PathBuf>, sheet_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            credentials_path: credentials_path.into(),
            sheet_url: sheet_url.filter(|s| !s.trim().is_empty()),
            api_base: SHEETS_API.to_string(),
            token: Mutex::new(None),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.token.lock().ok()?;
        let (tok, until) = guard.as_ref()?;
        (Instant::now() < *until).then(|| tok.clone())
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(tok) = self.cached_token() {
            return Ok(tok);
        }
        let raw = tokio::fs::read_to_string(&self.credentials_path)
            .await
            .with_context(|| format!("reading {}", self.credentials_path.display()))?;
        let sa: ServiceAccount = serde_json::from_str(&raw).context("parsing service account json")?;
        let token_uri = sa.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);

        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &sa.client_email,
            scope: SCOPE,
            aud: token_uri,
            iat: now,
            exp: now + 3600,
        };
        let key = EncodingKey::from_rsa_pem(sa.private_key.as_bytes()).context("service account private key")?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &key).context("signing jwt")?;

        let resp: TokenResponse = self
            .client
            .post(token_uri)
            .timeout(Duration::from_secs(15))
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .context("token exchange")?
            .error_for_status()
            .context("token exchange non-2xx")?
            .json()
            .await
            .context("token response")?;

        // refresh a minute early
        let ttl = resp.expires_in.unwrap_or(3600).saturating_sub(60);
        if let Ok(mut guard) = self.token.lock() {
            *guard = Some((resp.access_token.clone(), Instant::now() + Duration::from_secs(ttl)));
        }
        Ok(resp.access_token)
    }
}

#[async_trait::async_trait]
impl SheetSink for GoogleSheetsSink {
    async fn append_rows(&self, rows: &[ExportRow]) -> Result<AppendOutcome> {
        if !tokio::fs::try_exists(&self.credentials_path).await.unwrap_or(false) {
            tracing::error!(path = %self.credentials_path.display(), "❌ Credentials file not found!");
            return Ok(AppendOutcome::Skipped("credentials file missing"));
        }
        let Some(sheet_url) = &self.sheet_url else {
            tracing::error!("❌ GOOGLE_SHEET_URL not found in environment variables!");
            return Ok(AppendOutcome::Skipped("sheet url not configured"));
        };
        if rows.is_empty() {
            return Ok(AppendOutcome::Skipped("no rows"));
        }
        let id = spreadsheet_id(sheet_url).ok_or_else(|| anyhow!("cannot find spreadsheet id in {sheet_url}"))?;

        let token = self.access_token().await?;
        let body = AppendBody {
            values: rows.iter().cloned().map(ExportRow::into_cells).collect(),
        };
        tracing::debug!(rows = ?body.values, "Rows to append");

        self.client
            .post(format!("{}/{id}/values/A1:append", self.api_base))
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .bearer_auth(token)
            .timeout(Duration::from_secs(30))
            .json(&body)
            .send()
            .await
            .context("sheets append")?
            .error_for_status()
            .context("sheets append non-2xx")?;

        Ok(AppendOutcome::Appended(rows.len()))
    }
}

/// Records every batch it receives.
#[derive(Default)]
pub struct MockSheet {
    pub batches: Mutex<Vec<Vec<ExportRow>>>,
}

impl MockSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<ExportRow>> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl SheetSink for MockSheet {
    async fn append_rows(&self, rows: &[ExportRow]) -> Result<AppendOutcome> {
        if let Ok(mut b) = self.batches.lock() {
            b.push(rows.to_vec());
        }
        Ok(AppendOutcome::Appended(rows.len()))
    }
}
