// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::driver::{LoginCredentials, ProxySettings};
use crate::extract::{Marketplace, SourceConfig};
use crate::sheets::DEFAULT_CREDENTIALS_PATH;
use crate::store::DEFAULT_SEEN_PATH;

const ENV_SOURCES_PATH: &str = "SOURCES_CONFIG_PATH";
const DEFAULT_SOURCES_PATH: &str = "config/sources.toml";

/// Built-in search catalog, used when no sources file is present.
pub fn default_sources() -> Vec<SourceConfig> {
    use Marketplace::{Crowdworks, Lancers};
    [
        ("Lancers_web", "https://www.lancers.jp/work/search/web?open=1", Lancers),
        ("Lancers_system", "https://www.lancers.jp/work/search/system?open=1", Lancers),
        ("Lancers_AI", "https://www.lancers.jp/work/search/system/ai?open=1", Lancers),
        (
            "Lancers_Android",
            "https://www.lancers.jp/work/search/system/smartphoneapp?open=1",
            Lancers,
        ),
        ("CW_web", "https://crowdworks.jp/public/jobs/search?category_id=230&order=new", Crowdworks),
        ("CW_system", "https://crowdworks.jp/public/jobs/search?category_id=226&order=new", Crowdworks),
        ("CW_AI", "https://crowdworks.jp/public/jobs/search?category_id=311&order=new", Crowdworks),
        ("CW_Android", "https://crowdworks.jp/public/jobs/search?category_id=242&order=new", Crowdworks),
    ]
    .into_iter()
    .map(|(tag, url, m)| SourceConfig::new(tag, url, m))
    .collect()
}

/// Load the source catalog from an explicit TOML file.
pub fn load_sources_from(path: &Path) -> Result<Vec<SourceConfig>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    parse_sources(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Load the source catalog using env var + fallbacks:
/// 1) $SOURCES_CONFIG_PATH
/// 2) config/sources.toml
/// 3) built-in defaults
pub fn load_sources_default() -> Result<Vec<SourceConfig>> {
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        } else {
            return Err(anyhow!("SOURCES_CONFIG_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from(DEFAULT_SOURCES_PATH);
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    Ok(default_sources())
}

fn parse_sources(s: &str) -> Result<Vec<SourceConfig>> {
    #[derive(Deserialize)]
    struct SourcesFile {
        #[serde(rename = "source")]
        sources: Vec<SourceConfig>,
    }
    let v: SourcesFile = toml::from_str(s)?;

    let mut seen_tags = std::collections::BTreeSet::new();
    let mut out = Vec::with_capacity(v.sources.len());
    for mut src in v.sources {
        src.tag = src.tag.trim().to_string();
        src.url = src.url.trim().to_string();
        if src.tag.is_empty() || src.url.is_empty() {
            continue;
        }
        if !seen_tags.insert(src.tag.clone()) {
            return Err(anyhow!("duplicate source tag {}", src.tag));
        }
        out.push(src);
    }
    if out.is_empty() {
        return Err(anyhow!("no usable sources"));
    }
    Ok(out)
}

/// Runtime settings, all from the environment (optionally via `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: LoginCredentials,
    pub slack_webhook_url: Option<String>,
    pub google_sheet_url: Option<String>,
    pub google_credentials_path: PathBuf,
    pub seen_path: PathBuf,
    pub proxy: Option<ProxySettings>,
    pub check_interval: Duration,
    pub page_load_timeout: Duration,
    pub metrics_addr: Option<std::net::SocketAddr>,
    /// Skip TLS certificate checks (intercepting proxies). Off unless
    /// `ACCEPT_INVALID_CERTS` is set.
    pub accept_invalid_certs: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as `from_env`, reading through `get` so tests needn't touch
    /// the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let credentials = LoginCredentials {
            email: var("EMAIL_USER").context("EMAIL_USER is not set")?,
            password: var("EMAIL_PASS").context("EMAIL_PASS is not set")?,
        };

        let proxy = match (var("PROXY_ADDRESS"), var("PROXY_USERNAME"), var("PROXY_PASSWORD")) {
            (Some(address), Some(username), Some(password)) => {
                if !address.contains(':') {
                    return Err(anyhow!("PROXY_ADDRESS must be host:port"));
                }
                Some(ProxySettings {
                    address,
                    username,
                    password,
                })
            }
            (None, None, None) => None,
            _ => return Err(anyhow!("proxy details are incomplete (need PROXY_ADDRESS, PROXY_USERNAME, PROXY_PASSWORD)")),
        };

        let secs = |k: &str, default: u64| -> Result<Duration> {
            match var(k) {
                Some(v) => v
                    .parse::<u64>()
                    .ok()
                    .filter(|n| *n > 0)
                    .map(Duration::from_secs)
                    .ok_or_else(|| anyhow!("{k} must be a positive integer, got {v:?}")),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let metrics_addr = match var("METRICS_ADDR") {
            Some(a) => Some(a.parse::<std::net::SocketAddr>().with_context(|| format!("invalid METRICS_ADDR {a:?}"))?),
            None => None,
        };

        let accept_invalid_certs = match var("ACCEPT_INVALID_CERTS").map(|v| v.to_ascii_lowercase()) {
            None => false,
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(anyhow!("ACCEPT_INVALID_CERTS must be true or false, got {v:?}")),
            },
        };

        Ok(Self {
            credentials,
            slack_webhook_url: var("SLACK_WEBHOOK_URL"),
            google_sheet_url: var("GOOGLE_SHEET_URL"),
            google_credentials_path: var("GOOGLE_CREDENTIALS_PATH")
                .unwrap_or_else(|| DEFAULT_CREDENTIALS_PATH.to_string())
                .into(),
            seen_path: var("SEEN_PATH").unwrap_or_else(|| DEFAULT_SEEN_PATH.to_string()).into(),
            proxy,
            check_interval: secs("CHECK_INTERVAL_SECS", 60)?,
            page_load_timeout: secs("PAGE_LOAD_TIMEOUT_SECS", 30)?,
            metrics_addr,
            accept_invalid_certs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::{env, fs};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| m.get(k).cloned()
    }

    const CREDS: [(&str, &str); 2] = [("EMAIL_USER", "me@example.com"), ("EMAIL_PASS", "pw")];

    #[test]
    fn defaults_apply() {
        let cfg = AppConfig::from_lookup(lookup(&CREDS)).unwrap();
        assert_eq!(cfg.check_interval, Duration::from_secs(60));
        assert_eq!(cfg.page_load_timeout, Duration::from_secs(30));
        assert_eq!(cfg.seen_path, PathBuf::from("seen.json"));
        assert_eq!(cfg.google_credentials_path, PathBuf::from("service_account.json"));
        assert!(cfg.proxy.is_none());
        assert!(cfg.slack_webhook_url.is_none());
        assert!(cfg.metrics_addr.is_none());
    }

    #[test]
    fn login_credentials_are_required() {
        let err = AppConfig::from_lookup(lookup(&[("EMAIL_USER", "x")])).unwrap_err();
        assert!(format!("{err:#}").contains("EMAIL_PASS"));
    }

    #[test]
    fn proxy_needs_all_three() {
        let mut pairs = CREDS.to_vec();
        pairs.push(("PROXY_ADDRESS", "10.0.0.1:8080"));
        assert!(AppConfig::from_lookup(lookup(&pairs)).is_err());

        pairs.push(("PROXY_USERNAME", "u"));
        pairs.push(("PROXY_PASSWORD", "p"));
        let cfg = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(cfg.proxy.unwrap().address, "10.0.0.1:8080");
    }

    #[test]
    fn proxy_alone_keeps_tls_verification() {
        let mut pairs = CREDS.to_vec();
        pairs.extend([
            ("PROXY_ADDRESS", "10.0.0.1:8080"),
            ("PROXY_USERNAME", "u"),
            ("PROXY_PASSWORD", "p"),
        ]);
        let cfg = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert!(cfg.proxy.is_some());
        assert!(!cfg.accept_invalid_certs);

        pairs.push(("ACCEPT_INVALID_CERTS", "TRUE"));
        assert!(AppConfig::from_lookup(lookup(&pairs)).unwrap().accept_invalid_certs);

        let mut bad = CREDS.to_vec();
        bad.push(("ACCEPT_INVALID_CERTS", "maybe"));
        assert!(AppConfig::from_lookup(lookup(&bad)).is_err());
    }

    #[test]
    fn bad_interval_is_rejected() {
        let mut pairs = CREDS.to_vec();
        pairs.push(("CHECK_INTERVAL_SECS", "0"));
        assert!(AppConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn sources_toml_trims_and_rejects_duplicates() {
        let ok = r#"
            [[source]]
            tag = " Lancers_web "
            url = "https://www.lancers.jp/work/search/web?open=1"
            marketplace = "lancers"

            [[source]]
            tag = ""
            url = "https://ignored"
            marketplace = "crowdworks"

            [[source]]
            tag = "CW_web"
            url = "https://crowdworks.jp/public/jobs/search?category_id=230&order=new"
            marketplace = "crowdworks"
        "#;
        let v = parse_sources(ok).unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].tag, "Lancers_web");
        assert_eq!(v[1].marketplace, Marketplace::Crowdworks);

        let dup = r#"
            [[source]]
            tag = "A"
            url = "u1"
            marketplace = "lancers"
            [[source]]
            tag = "A"
            url = "u2"
            marketplace = "lancers"
        "#;
        assert!(parse_sources(dup).is_err());
    }

    #[test]
    fn default_catalog_covers_both_marketplaces() {
        let v = default_sources();
        assert_eq!(v.len(), 8);
        assert_eq!(v.iter().filter(|s| s.marketplace == Marketplace::Lancers).count(), 4);
        assert!(v.iter().any(|s| s.tag == "CW_AI"));
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        // Isolate CWD so the repo's own config/ doesn't interfere.
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        env::remove_var(ENV_SOURCES_PATH);

        // No files → built-in catalog
        assert_eq!(load_sources_default().unwrap(), default_sources());

        // Env wins
        let p = tmp.path().join("mine.toml");
        fs::write(&p, "[[source]]\ntag = \"X\"\nurl = \"https://x\"\nmarketplace = \"lancers\"\n").unwrap();
        env::set_var(ENV_SOURCES_PATH, p.display().to_string());
        let v = load_sources_default().unwrap();
        assert_eq!(v, vec![SourceConfig::new("X", "https://x", Marketplace::Lancers)]);

        env::set_var(ENV_SOURCES_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(load_sources_default().is_err());
        env::remove_var(ENV_SOURCES_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
