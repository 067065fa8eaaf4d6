// src/notify/slack.rs
use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::{NewJobAlert, Notifier};

pub struct SlackNotifier {
    webhook_url: Option<String>,
    client: Client,
    timeout: Duration,
}

impl SlackNotifier {
    pub fn from_url(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url: webhook_url.filter(|u| !u.trim().is_empty()),
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Optional builder for tests/tools
    pub fn new(url: String) -> Self {
        Self::from_url(Some(url))
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }
}

/// Slack mrkdwn body; `<!channel>` pings everyone in the channel.
/// Titles are escaped since `&`, `<` and `>` are control characters in mrkdwn.
pub fn format_message(alert: &NewJobAlert) -> String {
    let title = html_escape::encode_text(&alert.title);
    format!(
        "{} : <!channel>\n\
         *New [{}] job found!* 🎉\n\
         *Price:* {}\n\
         *Title:* {}\n\
         *Link:* {}\n\
         ----------------------------------------------------------",
        alert.time, alert.source_tag, alert.price, title, alert.url
    )
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, alert: &NewJobAlert) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            tracing::debug!("Slack disabled (no SLACK_WEBHOOK_URL)");
            return Ok(());
        };

        let body = serde_json::json!({ "text": format_message(alert) });
        let resp = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("slack post")?;

        let status = resp.status();
        if status == StatusCode::OK {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(anyhow!("slack returned {status}: {text}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_layout() {
        let alert = NewJobAlert {
            time: "2025-09-06 09:00:00".into(),
            source_tag: "CW_AI".into(),
            price: "1000 ~ 2000".into(),
            title: "Chatbot build".into(),
            url: "https://crowdworks.jp/public/jobs/42".into(),
        };
        let msg = format_message(&alert);
        let lines: Vec<&str> = msg.lines().collect();
        assert_eq!(lines[0], "2025-09-06 09:00:00 : <!channel>");
        assert_eq!(lines[1], "*New [CW_AI] job found!* 🎉");
        assert_eq!(lines[2], "*Price:* 1000 ~ 2000");
        assert_eq!(lines[3], "*Title:* Chatbot build");
        assert_eq!(lines[4], "*Link:* https://crowdworks.jp/public/jobs/42");
        assert!(lines[5].starts_with("-----"));
    }

    #[test]
    fn title_control_chars_are_escaped() {
        let alert = NewJobAlert {
            time: "t".into(),
            source_tag: "Lancers_web".into(),
            price: "N/A".into(),
            title: "Q&A <bot>".into(),
            url: "u".into(),
        };
        assert!(format_message(&alert).contains("*Title:* Q&amp;A &lt;bot&gt;"));
    }

    #[test]
    fn blank_url_disables() {
        assert!(!SlackNotifier::from_url(Some("  ".into())).is_enabled());
        assert!(!SlackNotifier::from_url(None).is_enabled());
        assert!(SlackNotifier::new("https://hooks.slack.com/x".into()).is_enabled());
    }
}
