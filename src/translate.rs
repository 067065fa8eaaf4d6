// src/translate.rs
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Hiragana, Katakana, CJK unified ideographs, half-width Katakana.
const JAPANESE_RANGES: [(u32, u32); 4] = [
    (0x3040, 0x309F),
    (0x30A0, 0x30FF),
    (0x4E00, 0x9FFF),
    (0xFF66, 0xFF9F),
];

pub fn is_japanese_text(text: &str) -> bool {
    text.chars().any(|ch| {
        let code = ch as u32;
        JAPANESE_RANGES
            .iter()
            .any(|&(start, end)| (start..=end).contains(&code))
    })
}

#[async_trait::async_trait]
pub trait Translator: Send + Sync {
    async fn to_english(&self, text: &str) -> Result<String>;
}

/// Translate Japanese text, falling back to the input on any failure.
/// Non-Japanese text is returned untouched without calling the backend.
pub async fn translate_title(translator: &dyn Translator, title: &str) -> String {
    if title.is_empty() || !is_japanese_text(title) {
        return title.to_string();
    }
    match translator.to_english(title).await {
        Ok(t) if !t.trim().is_empty() => {
            tracing::info!(from = %truncate(title, 50), to = %truncate(&t, 50), "translated title");
            t
        }
        Ok(_) => {
            tracing::warn!(title = %truncate(title, 50), "⚠️ empty translation, keeping original");
            title.to_string()
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "❌ Translation error");
            title.to_string()
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

const GTX_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";
// Keeps the GET query comfortably under URL length limits.
const MAX_CHARS: usize = 5000;

/// Public Google Translate `gtx` endpoint, ja → en.
pub struct GoogleTranslator {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl GoogleTranslator {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            endpoint: GTX_ENDPOINT.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Point at another endpoint (tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for GoogleTranslator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Translator for GoogleTranslator {
    async fn to_english(&self, text: &str) -> Result<String> {
        if text.chars().count() > MAX_CHARS {
            return Err(anyhow!("text too long to translate ({} chars)", text.chars().count()));
        }
        let body: Value = self
            .client
            .get(&self.endpoint)
            .timeout(self.timeout)
            .query(&[("client", "gtx"), ("sl", "ja"), ("tl", "en"), ("dt", "t"), ("q", text)])
            .send()
            .await
            .context("translate request")?
            .error_for_status()
            .context("translate non-2xx")?
            .json()
            .await
            .context("translate body")?;
        parse_gtx(&body)
    }
}

/// `[[["Hello","こんにちは",...], ["world","世界",...]], ...]` → "Helloworld".
fn parse_gtx(body: &Value) -> Result<String> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("unexpected translate response shape"))?;
    let out: String = segments
        .iter()
        .filter_map(|seg| seg.get(0).and_then(Value::as_str))
        .collect();
    Ok(out)
}

/// Fixed-table translator for tests.
#[derive(Default)]
pub struct MockTranslator {
    pub table: std::collections::HashMap<String, String>,
    pub calls: std::sync::Mutex<Vec<String>>,
}

impl MockTranslator {
    pub fn with(mut self, from: &str, to: &str) -> Self {
        self.table.insert(from.to_string(), to.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Translator for MockTranslator {
    async fn to_english(&self, text: &str) -> Result<String> {
        if let Ok(mut c) = self.calls.lock() {
            c.push(text.to_string());
        }
        self.table
            .get(text)
            .cloned()
            .ok_or_else(|| anyhow!("no translation for {text}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_japanese_ranges() {
        assert!(is_japanese_text("テスト"));
        assert!(is_japanese_text("ひらがな"));
        assert!(is_japanese_text("開発"));
        assert!(is_japanese_text("ｱﾌﾟﾘ"));
        assert!(is_japanese_text("Rust案件"));
        assert!(!is_japanese_text("Build a REST API"));
        assert!(!is_japanese_text(""));
        assert!(!is_japanese_text("Ünïcödé ✨"));
    }

    #[tokio::test]
    async fn non_japanese_is_identity_without_backend_call() {
        let t = MockTranslator::default();
        assert_eq!(translate_title(&t, "Build a REST API").await, "Build a REST API");
        assert_eq!(translate_title(&t, "").await, "");
        assert_eq!(t.call_count(), 0);
    }

    #[tokio::test]
    async fn failure_keeps_original_title() {
        let t = MockTranslator::default();
        assert_eq!(translate_title(&t, "未知のタイトル").await, "未知のタイトル");
        assert_eq!(t.call_count(), 1);

        let t = MockTranslator::default().with("テスト", "Test");
        assert_eq!(translate_title(&t, "テスト").await, "Test");
    }

    #[test]
    fn gtx_segments_are_joined() {
        let body = serde_json::json!([[["Web site ", "ウェブサイト", null], ["production", "制作", null]], null, "ja"]);
        assert_eq!(parse_gtx(&body).unwrap(), "Web site production");
        assert!(parse_gtx(&serde_json::json!({"error": 1})).is_err());
    }
}
