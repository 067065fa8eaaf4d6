// src/extract/lancers.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

use super::{open_page, poll_document, ListingSource, Readiness};
use crate::driver::PageDriver;
use crate::listing::{is_excluded_kind, Listing};

pub const DETAIL_URL_PREFIX: &str = "https://www.lancers.jp/work/detail/";

/// Results (or the "no results" wrapper) render server-side; allow a minute.
pub const DEFAULT_READINESS: Readiness = Readiness::new(30, Duration::from_secs(2));

static RE_DETAIL_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"goToLjpWorkDetail\((\d+)\)").expect("static regex"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static SEL_READY: Lazy<Selector> =
    Lazy::new(|| sel(".p-search-job-medias--lancer, .p-search-job-media"));
static SEL_CARD: Lazy<Selector> = Lazy::new(|| sel(".p-search-job-media.c-media.c-media--item"));
static SEL_TITLE: Lazy<Selector> = Lazy::new(|| sel(".p-search-job-media__title.c-media__title"));
static SEL_BADGE: Lazy<Selector> = Lazy::new(|| sel(".c-badge__text"));
static SEL_PRICE: Lazy<Selector> = Lazy::new(|| sel(".p-search-job-media__price"));
static SEL_NUMBER: Lazy<Selector> = Lazy::new(|| sel(".p-search-job-media__number"));

pub struct LancersSource {
    tag: String,
    url: String,
    readiness: Readiness,
}

impl LancersSource {
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
impl ListingSource for LancersSource {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn fetch_listings(&self, driver: &mut dyn PageDriver) -> Result<Vec<Listing>> {
        tracing::info!(source = %self.tag, "Getting jobs from Lancers...");
        open_page(driver, &self.url, &self.tag)
            .await
            .with_context(|| format!("loading {}", self.url))?;

        let ready = poll_document(driver, self.readiness, |html: &str| {
            let doc = Html::parse_document(html);
            let rendered = doc.select(&SEL_READY).next().is_some();
            rendered.then(|| html.to_string())
        })
        .await;

        let Some(html) = ready else {
            tracing::info!(source = %self.tag, "No jobs found or page failed to load");
            return Ok(Vec::new());
        };

        let jobs = parse_search_page(&html, &self.tag);
        tracing::info!(source = %self.tag, count = jobs.len(), "Found jobs from Lancers.");
        Ok(jobs)
    }
}

/// Pull every usable card out of a rendered search page.
///
/// Cards without a detail id are ignored, malformed cards are logged and
/// skipped, and excluded job types (recruiting, competitions) are dropped.
pub fn parse_search_page(html: &str, tag: &str) -> Vec<Listing> {
    let doc = Html::parse_document(html);
    let mut out = Vec::new();
    for card in doc.select(&SEL_CARD) {
        match parse_card(card, tag) {
            Ok(Some(listing)) if is_excluded_kind(&listing.kind) => {
                tracing::debug!(source = tag, id = %listing.id, kind = %listing.kind, "excluded job type");
            }
            Ok(Some(listing)) => out.push(listing),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(source = tag, error = %format!("{e:#}"), "⚠️ Skipping unparsable Lancers card");
                counter!("cycle_entry_errors_total").increment(1);
            }
        }
    }
    out
}

fn parse_card(card: ElementRef<'_>, tag: &str) -> Result<Option<Listing>> {
    let Some(id) = card
        .value()
        .attr("onclick")
        .and_then(|s| RE_DETAIL_ID.captures(s))
        .map(|c| c[1].to_string())
    else {
        return Ok(None);
    };

    let title_el = card
        .select(&SEL_TITLE)
        .next()
        .ok_or_else(|| anyhow!("card {id}: no title element"))?;
    let title = last_nonempty_line(&title_el.text().collect::<String>())
        .ok_or_else(|| anyhow!("card {id}: empty title"))?;

    let kind = card
        .select(&SEL_BADGE)
        .next()
        .map(|el| collapse_ws(&el.text().collect::<String>()))
        .ok_or_else(|| anyhow!("card {id}: no job type badge"))?;

    let price_el = card
        .select(&SEL_PRICE)
        .next()
        .ok_or_else(|| anyhow!("card {id}: no price block"))?;
    let numbers: Vec<String> = price_el
        .select(&SEL_NUMBER)
        .map(|el| collapse_ws(&el.text().collect::<String>()))
        .collect();

    Ok(Some(Listing {
        source_tag: tag.to_string(),
        url: format!("{DETAIL_URL_PREFIX}{id}"),
        id,
        kind,
        title,
        price: format_price(&numbers),
    }))
}

/// The title block also carries badges ("NEW", "急募", ...) on earlier lines;
/// the job title itself is the last non-empty line.
fn last_nonempty_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .map(str::to_string)
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Exactly two numbers form a range; otherwise the first one stands alone.
/// None means no price shown.
pub fn format_price(numbers: &[String]) -> String {
    match numbers {
        [min, max] => format!("{min} ~ {max}"),
        [first, ..] => first.clone(),
        [] => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(onclick: &str, badge: &str, title_block: &str, numbers: &[&str]) -> String {
        let nums: String = numbers
            .iter()
            .map(|n| format!(r#"<span class="p-search-job-media__number">{n}</span>"#))
            .collect();
        format!(
            r#"<div class="p-search-job-media c-media c-media--item" onclick="{onclick}">
                 <span class="c-badge"><span class="c-badge__text">{badge}</span></span>
                 <a class="p-search-job-media__title c-media__title">{title_block}</a>
                 <div class="p-search-job-media__price">{nums}<span>円</span></div>
               </div>"#
        )
    }

    fn page(cards: &[String]) -> String {
        format!(
            r#"<html><body><div class="p-search-job-medias--lancer">{}</div></body></html>"#,
            cards.concat()
        )
    }

    #[test]
    fn title_is_last_line_and_price_is_range() {
        let html = page(&[card(
            "goToLjpWorkDetail(5012345)",
            "プロジェクト",
            "\n  NEW\n  急募\n  ECサイトの改修\n  ",
            &["10,000", "50,000"],
        )]);
        let jobs = parse_search_page(&html, "Lancers_web");
        assert_eq!(
            jobs,
            vec![Listing {
                source_tag: "Lancers_web".into(),
                id: "5012345".into(),
                kind: "プロジェクト".into(),
                title: "ECサイトの改修".into(),
                price: "10,000 ~ 50,000".into(),
                url: "https://www.lancers.jp/work/detail/5012345".into(),
            }]
        );
    }

    #[test]
    fn single_and_missing_price() {
        let html = page(&[
            card("goToLjpWorkDetail(1)", "タスク", "A", &["3,000"]),
            card("goToLjpWorkDetail(2)", "プロジェクト", "B", &[]),
        ]);
        let prices: Vec<String> = parse_search_page(&html, "t").into_iter().map(|l| l.price).collect();
        assert_eq!(prices, vec!["3,000", "N/A"]);
    }

    #[test]
    fn excluded_kinds_are_dropped() {
        let html = page(&[
            card("goToLjpWorkDetail(10)", "求人", "recruit", &["1"]),
            card("goToLjpWorkDetail(11)", "コンペ", "logo contest", &["1"]),
            card("goToLjpWorkDetail(12)", "プロジェクト", "keep me", &["1"]),
        ]);
        let ids: Vec<String> = parse_search_page(&html, "t").into_iter().map(|l| l.id).collect();
        assert_eq!(ids, vec!["12"]);
    }

    #[test]
    fn cards_without_id_are_ignored_and_broken_cards_skipped() {
        let broken = r#"<div class="p-search-job-media c-media c-media--item"
                             onclick="goToLjpWorkDetail(99)"><span>no title</span></div>"#;
        let html = page(&[
            card("trackClick()", "プロジェクト", "no id", &["1"]),
            broken.to_string(),
            card("goToLjpWorkDetail(100)", "プロジェクト", "fine", &["1", "2"]),
        ]);
        let jobs = parse_search_page(&html, "t");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "100");
    }

    #[test]
    fn format_price_shapes() {
        assert_eq!(format_price(&["1".into(), "2".into()]), "1 ~ 2");
        assert_eq!(format_price(&["5".into()]), "5");
        assert_eq!(format_price(&[]), "N/A");
        assert_eq!(format_price(&["3".into(), "4".into(), "5".into()]), "3");
    }
}
