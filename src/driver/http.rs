// src/driver/http.rs
use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

use super::{DriverError, LoginCredentials, PageDriver};

pub const LANCERS_LOGIN_URL: &str = "https://www.lancers.jp/user/login?ref=header_menu";
pub const LANCERS_MYPAGE_PREFIX: &str = "https://www.lancers.jp/mypage";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

/// Authenticated HTTP proxy (`host:port` plus basic-auth credentials).
#[derive(Clone)]
pub struct ProxySettings {
    pub address: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for ProxySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxySettings")
            .field("address", &self.address)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Cookie-keeping HTTP client standing in for a browser tab.
///
/// The first `page_source` after a navigation returns the body that
/// navigation fetched; later reads fetch the URL again so readiness polling
/// sees the page as it is now. After `stop_loading` the document is frozen.
pub struct HttpDriver {
    client: Client,
    page_timeout: Duration,
    current: Option<String>,
    // URL to re-fetch on the next read; None once the page is frozen.
    live_url: Option<String>,
    unread: bool,
    closed: bool,
}

impl HttpDriver {
    /// `accept_invalid_certs` disables TLS verification for every request,
    /// the login included. Only for proxies that intercept TLS.
    pub fn new(
        page_timeout: Duration,
        proxy: Option<&ProxySettings>,
        accept_invalid_certs: bool,
    ) -> Result<Self> {
        if accept_invalid_certs {
            tracing::warn!("⚠️ TLS certificate verification is disabled");
        }
        let mut builder = Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(accept_invalid_certs);
        if let Some(p) = proxy {
            let proxy = reqwest::Proxy::all(format!("http://{}", p.address))
                .with_context(|| format!("invalid proxy address {}", p.address))?
                .basic_auth(&p.username, &p.password);
            builder = builder.proxy(proxy);
        }
        let client = builder.build().context("building http driver client")?;
        Ok(Self {
            client,
            page_timeout,
            current: None,
            live_url: None,
            unread: false,
            closed: false,
        })
    }

    async fn fetch(&self, url: &str) -> Result<String, DriverError> {
        let resp = self
            .client
            .get(url)
            .timeout(self.page_timeout)
            .send()
            .await
            .map_err(|e| map_reqwest(e, self.page_timeout))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DriverError::Navigation(format!("{url} returned {status}")));
        }
        resp.text()
            .await
            .map_err(|e| map_reqwest(e, self.page_timeout))
    }

    /// Sign in through the marketplace login form. The session cookie stays
    /// in the client for every later navigation.
    pub async fn login(&mut self, creds: &LoginCredentials) -> Result<(), DriverError> {
        tracing::info!("Navigating to login page...");
        self.navigate(LANCERS_LOGIN_URL).await?;
        let html = self.page_source().await?;
        let base = Url::parse(LANCERS_LOGIN_URL).map_err(|e| DriverError::Login(e.to_string()))?;
        let form = parse_login_form(&html, &base, creds).map_err(|e| DriverError::Login(format!("{e:#}")))?;

        let resp = self
            .client
            .post(form.action)
            .timeout(self.page_timeout)
            .form(&form.fields)
            .send()
            .await
            .map_err(|e| map_reqwest(e, self.page_timeout))?;

        let landed = resp.url().to_string();
        self.current = resp.text().await.ok();
        self.live_url = None;
        if landed.starts_with(LANCERS_MYPAGE_PREFIX) {
            tracing::info!("✅ Login successful.");
            Ok(())
        } else {
            tracing::error!(landed = %landed, "❌ Login failed or took too long.");
            Err(DriverError::Login(format!("landed on {landed}")))
        }
    }
}

#[async_trait::async_trait]
impl PageDriver for HttpDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::Navigation("driver already quit".into()));
        }
        self.current = None;
        self.live_url = None;
        let body = self.fetch(url).await?;
        self.current = Some(body);
        self.live_url = Some(url.to_string());
        self.unread = true;
        Ok(())
    }

    async fn stop_loading(&mut self) -> Result<(), DriverError> {
        self.live_url = None;
        if self.current.is_none() {
            self.current = Some(String::new());
        }
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, DriverError> {
        let cached = self.current.clone().ok_or(DriverError::NoPage)?;
        if std::mem::take(&mut self.unread) {
            return Ok(cached);
        }
        let Some(url) = self.live_url.clone() else {
            return Ok(cached);
        };
        match self.fetch(&url).await {
            Ok(body) => {
                self.current = Some(body.clone());
                Ok(body)
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "re-read failed, keeping last document");
                Ok(cached)
            }
        }
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        self.closed = true;
        self.current = None;
        self.live_url = None;
        Ok(())
    }
}

fn map_reqwest(e: reqwest::Error, timeout: Duration) -> DriverError {
    if e.is_timeout() {
        DriverError::Timeout(timeout)
    } else {
        DriverError::Navigation(e.to_string())
    }
}

#[derive(Debug)]
struct LoginForm {
    action: Url,
    fields: Vec<(String, String)>,
}

/// Locate the form holding `#UserEmail`, keep its hidden inputs (CSRF tokens
/// and the like) and fill in the credentials under the inputs' own names.
fn parse_login_form(html: &str, base: &Url, creds: &LoginCredentials) -> Result<LoginForm> {
    let doc = Html::parse_document(html);
    let sel_email = Selector::parse("#UserEmail").map_err(|e| anyhow!("{e}"))?;
    let sel_pass = Selector::parse("#UserPassword").map_err(|e| anyhow!("{e}"))?;
    let sel_hidden = Selector::parse("input[type=hidden]").map_err(|e| anyhow!("{e}"))?;
    let sel_submit = Selector::parse("#form_submit").map_err(|e| anyhow!("{e}"))?;

    let email = doc
        .select(&sel_email)
        .next()
        .context("no #UserEmail input on login page")?;
    let pass = doc
        .select(&sel_pass)
        .next()
        .context("no #UserPassword input on login page")?;

    let form = email
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "form")
        .context("#UserEmail is not inside a form")?;

    let action = match form.value().attr("action") {
        Some(a) if !a.trim().is_empty() => base.join(a.trim()).context("bad form action")?,
        _ => base.clone(),
    };

    let mut fields: Vec<(String, String)> = form
        .select(&sel_hidden)
        .filter_map(|el| {
            let name = el.value().attr("name")?;
            Some((name.to_string(), el.value().attr("value").unwrap_or_default().to_string()))
        })
        .collect();

    let email_name = email.value().attr("name").unwrap_or("email");
    let pass_name = pass.value().attr("name").unwrap_or("password");
    fields.push((email_name.to_string(), creds.email.clone()));
    fields.push((pass_name.to_string(), creds.password.clone()));

    if let Some(submit) = form.select(&sel_submit).next() {
        if let Some(name) = submit.value().attr("name") {
            let value = submit.value().attr("value").unwrap_or_default();
            fields.push((name.to_string(), value.to_string()));
        }
    }

    Ok(LoginForm { action, fields })
}
