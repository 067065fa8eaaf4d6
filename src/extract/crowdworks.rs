// src/extract/crowdworks.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::{open_page, poll_document, ListingSource, Readiness};
use crate::driver::PageDriver;
use crate::listing::{Listing, KIND_NOT_SPECIFIED};

pub const DETAIL_URL_PREFIX: &str = "https://crowdworks.jp/public/jobs/";

/// The search payload is written into `#vue-container[data]` by client
/// script after load; give it a few short retries.
pub const DEFAULT_READINESS: Readiness = Readiness::new(5, Duration::from_secs(2));

static SEL_CONTAINER: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#vue-container").expect("static selector"));

pub struct CrowdWorksSource {
    tag: String,
    url: String,
    readiness: Readiness,
}

impl CrowdWorksSource {
    pub fn new(tag: &str, url: &str) -> Self {
        Self {
            tag: tag.to_string(),
            url: url.to_string(),
            readiness: DEFAULT_READINESS,
        }
    }

    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }
}

#[async_trait]
impl ListingSource for CrowdWorksSource {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn fetch_listings(&self, driver: &mut dyn PageDriver) -> Result<Vec<Listing>> {
        tracing::info!(source = %self.tag, "Getting jobs from Crowdworks...");
        open_page(driver, &self.url, &self.tag)
            .await
            .with_context(|| format!("loading {}", self.url))?;

        let Some(payload) = poll_document(driver, self.readiness, extract_payload).await else {
            tracing::warn!(
                source = %self.tag,
                "⚠️ No data attribute found in vue-container after waiting. Skipping this source."
            );
            return Ok(Vec::new());
        };

        let jobs = parse_payload(&payload, &self.tag)
            .with_context(|| format!("parsing Crowdworks payload for {}", self.tag))?;
        tracing::info!(source = %self.tag, count = jobs.len(), "Found jobs from Crowdworks.");
        Ok(jobs)
    }
}

/// The raw JSON held by `#vue-container[data]`, if populated.
pub fn extract_payload(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let data = doc.select(&SEL_CONTAINER).next()?.value().attr("data")?;
    let data = data.trim();
    (!data.is_empty()).then(|| data.to_string())
}

#[derive(Debug, Deserialize)]
struct Offer {
    job_offer: JobOffer,
    #[serde(default)]
    payment: Option<Payment>,
}

#[derive(Debug, Deserialize)]
struct JobOffer {
    id: Value,
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct Payment {
    #[serde(default)]
    fixed_price_payment: Option<FixedPrice>,
    #[serde(default)]
    hourly_payment: Option<Hourly>,
}

#[derive(Debug, Default, Deserialize)]
struct FixedPrice {
    #[serde(default)]
    min_budget: Option<Value>,
    #[serde(default)]
    max_budget: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Hourly {
    #[serde(default)]
    min_hourly_wage: Option<Value>,
    #[serde(default)]
    max_hourly_wage: Option<Value>,
}

/// Parse the search payload. A payload without `searchResult.job_offers`
/// yields nothing; a malformed offer is skipped on its own.
pub fn parse_payload(payload: &str, tag: &str) -> Result<Vec<Listing>> {
    let data: Value = serde_json::from_str(payload).context("payload is not JSON")?;
    let Some(offers) = data
        .get("searchResult")
        .and_then(|r| r.get("job_offers"))
        .and_then(Value::as_array)
    else {
        tracing::warn!(source = tag, "⚠️ No job_offers found in Crowdworks data. Skipping this source.");
        return Ok(Vec::new());
    };

    let mut out = Vec::with_capacity(offers.len());
    for raw in offers {
        match parse_offer(raw, tag) {
            Ok(listing) => out.push(listing),
            Err(e) => {
                tracing::warn!(source = tag, error = %format!("{e:#}"), "⚠️ Error processing individual job offer. Skipping this job.");
                counter!("cycle_entry_errors_total").increment(1);
            }
        }
    }
    Ok(out)
}

fn parse_offer(raw: &Value, tag: &str) -> Result<Listing> {
    let offer = Offer::deserialize(raw).context("unexpected job offer shape")?;
    let id = match &offer.job_offer.id {
        Value::Number(n) => n.to_string(),
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        other => anyhow::bail!("unusable job id {other}"),
    };
    let price = offer.payment.as_ref().map_or_else(|| "discuss".to_string(), format_payment);

    Ok(Listing {
        source_tag: tag.to_string(),
        url: format!("{DETAIL_URL_PREFIX}{id}"),
        id,
        kind: KIND_NOT_SPECIFIED.to_string(),
        title: offer.job_offer.title,
        price,
    })
}

fn format_payment(p: &Payment) -> String {
    if let Some(f) = &p.fixed_price_payment {
        format_fixed_price(amount(&f.min_budget), amount(&f.max_budget))
    } else if let Some(h) = &p.hourly_payment {
        format_hourly_price(amount(&h.min_hourly_wage), amount(&h.max_hourly_wage))
    } else {
        "discuss".to_string()
    }
}

/// Budgets arrive as numbers (sometimes floats) or numeric strings; they are
/// truncated to whole yen. Zero means "not set".
fn amount(v: &Option<Value>) -> Option<i64> {
    let n = match v.as_ref()? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    let whole = n.trunc() as i64;
    (whole != 0).then_some(whole)
}

/// Both bounds → range; only the upper bound → that bound; otherwise
/// the client wants to discuss.
pub fn format_fixed_price(min: Option<i64>, max: Option<i64>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("{lo} ~ {hi}"),
        (_, Some(hi)) => hi.to_string(),
        _ => "discuss".to_string(),
    }
}

pub fn format_hourly_price(min: Option<i64>, max: Option<i64>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("{lo} ~ {hi} (hourly)"),
        (_, Some(hi)) => format!("{hi} (hourly)"),
        _ => "discuss".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_formatting() {
        assert_eq!(format_fixed_price(Some(1000), Some(5000)), "1000 ~ 5000");
        assert_eq!(format_fixed_price(None, Some(3000)), "3000");
        assert_eq!(format_fixed_price(None, None), "discuss");
        assert_eq!(format_fixed_price(Some(1000), None), "discuss");
        assert_eq!(format_hourly_price(Some(1500), Some(2500)), "1500 ~ 2500 (hourly)");
        assert_eq!(format_hourly_price(None, Some(2500)), "2500 (hourly)");
    }

    #[test]
    fn amounts_truncate_and_treat_zero_as_missing() {
        assert_eq!(amount(&Some(serde_json::json!(1500.9))), Some(1500));
        assert_eq!(amount(&Some(serde_json::json!("2000"))), Some(2000));
        assert_eq!(amount(&Some(serde_json::json!(0))), None);
        assert_eq!(amount(&Some(Value::Null)), None);
        assert_eq!(amount(&None), None);
    }

    #[test]
    fn payload_offers_map_to_listings() {
        let payload = r#"{"searchResult":{"job_offers":[
            {"job_offer":{"id":111,"title":"WordPressサイト修正"},
             "payment":{"fixed_price_payment":{"min_budget":10000.0,"max_budget":50000.0}}},
            {"job_offer":{"id":222,"title":"Data entry"},
             "payment":{"hourly_payment":{"min_hourly_wage":1500,"max_hourly_wage":2500}}},
            {"job_offer":{"id":333,"title":"Logo"}}
        ]}}"#;
        let jobs = parse_payload(payload, "CW_web").unwrap();
        let got: Vec<(&str, &str, &str)> = jobs
            .iter()
            .map(|l| (l.id.as_str(), l.price.as_str(), l.url.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("111", "10000 ~ 50000", "https://crowdworks.jp/public/jobs/111"),
                ("222", "1500 ~ 2500 (hourly)", "https://crowdworks.jp/public/jobs/222"),
                ("333", "discuss", "https://crowdworks.jp/public/jobs/333"),
            ]
        );
        assert!(jobs.iter().all(|l| l.kind == KIND_NOT_SPECIFIED));
    }

    #[test]
    fn bad_offer_is_skipped_not_fatal() {
        let payload = r#"{"searchResult":{"job_offers":[
            {"job_offer":{"title":"no id"}},
            {"nothing":"here"},
            {"job_offer":{"id":5,"title":"ok"}}
        ]}}"#;
        let jobs = parse_payload(payload, "CW_AI").unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "5");
    }

    #[test]
    fn missing_job_offers_is_empty_and_garbage_is_error() {
        assert!(parse_payload(r#"{"searchResult":{}}"#, "t").unwrap().is_empty());
        assert!(parse_payload(r#"{"other":1}"#, "t").unwrap().is_empty());
        assert!(parse_payload("<html>", "t").is_err());
    }

    #[test]
    fn payload_is_read_from_container_attribute() {
        let html = r#"<div id="vue-container" data="{&quot;searchResult&quot;:{&quot;job_offers&quot;:[]}}"></div>"#;
        assert_eq!(
            extract_payload(html).as_deref(),
            Some(r#"{"searchResult":{"job_offers":[]}}"#)
        );
        assert_eq!(extract_payload(r#"<div id="vue-container" data="  "></div>"#), None);
        assert_eq!(extract_payload("<div></div>"), None);
    }
}
