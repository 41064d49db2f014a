/// Forwarding of server errors to a Telegram chat via the Bot API
use crate::config::ErrorReportConfig;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

const BOT_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    parse_mode: &'static str,
    text: String,
}

/// One failed request, as reported
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub status: u16,
    pub method: String,
    pub url: String,
    pub message: String,
    pub detail: String,
}

impl ErrorReport {
    /// Message text in legacy Markdown
    pub fn to_markdown(&self) -> String {
        format!(
            "🔥 *{}*\n\n`[{}] {} {}`\n\n```\n{}\n```",
            markdown_safe(&self.message),
            self.status,
            self.method,
            markdown_safe(&self.url),
            self.detail.replace("```", "'''"),
        )
    }
}

/// Escape characters that legacy Markdown treats as entity delimiters
pub fn markdown_safe(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Posts error reports to the configured chat
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    http_client: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl ErrorReporter {
    pub fn new(config: &ErrorReportConfig) -> Result<Self, reqwest::Error> {
        Self::with_base_url(config, BOT_API_BASE)
    }

    pub fn with_base_url(config: &ErrorReportConfig, base_url: &str) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http_client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                base_url.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
        })
    }

    /// Send one report; failures are logged and dropped
    pub async fn send(&self, report: &ErrorReport) {
        let body = SendMessage {
            chat_id: &self.chat_id,
            parse_mode: "Markdown",
            text: report.to_markdown(),
        };

        match self.http_client.post(&self.endpoint).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(status = report.status, "Error report sent");
            }
            Ok(resp) => {
                error!(status = %resp.status(), "Failed to send error report to Telegram");
            }
            Err(e) => {
                error!("Failed to send error report to Telegram: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> ErrorReport {
        ErrorReport {
            status: 500,
            method: "GET".into(),
            url: "http://localhost/api/v1/users_me".into(),
            message: "Failed to connect to Telegram".into(),
            detail: "Connection { reason: \"refused\" }".into(),
        }
    }

    #[test]
    fn test_markdown_safe() {
        assert_eq!(markdown_safe("a_b*c`d[e]"), "a\\_b\\*c\\`d\\[e]");
        assert_eq!(markdown_safe("plain text"), "plain text");
    }

    #[test]
    fn test_report_text() {
        let text = report().to_markdown();
        assert!(text.starts_with("🔥 *Failed to connect to Telegram*"));
        assert!(text.contains("`[500] GET http://localhost/api/v1/users\\_me`"));
        assert!(text.contains("refused"));
    }

    #[test]
    fn test_endpoint_contains_token() {
        let reporter = ErrorReporter::with_base_url(
            &ErrorReportConfig {
                bot_token: "123:abc".into(),
                chat_id: "-100".into(),
            },
            "http://127.0.0.1:9/",
        )
        .unwrap();
        assert_eq!(reporter.endpoint, "http://127.0.0.1:9/bot123:abc/sendMessage");
    }

    #[tokio::test]
    async fn test_send_failure_is_swallowed() {
        let reporter = ErrorReporter::with_base_url(
            &ErrorReportConfig {
                bot_token: "t".into(),
                chat_id: "1".into(),
            },
            "http://127.0.0.1:9",
        )
        .unwrap();
        reporter.send(&report()).await;
    }
}
