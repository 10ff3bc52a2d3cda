//! Chat webhook sink (WeChat Work robot protocol).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use scan_common::config::WebhookSinkConfig;

use crate::screener::{ResultSet, ScreenerReport};

use super::{Sink, SinkError, SinkStatus};

/// Message body
#[derive(Debug, Serialize)]
#[serde(tag = "msgtype", rename_all = "snake_case")]
enum WebhookMessage {
    Text { text: WebhookContent },
    Markdown { markdown: WebhookContent },
}

#[derive(Debug, Serialize)]
struct WebhookContent {
    content: String,
}

/// Robot response
#[derive(Debug, Deserialize)]
struct WebhookResponse {
    errcode: Option<i64>,
    #[serde(default)]
    errmsg: String,
}

pub struct WebhookSink {
    url: Option<String>,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            url: url.filter(|u| !u.trim().is_empty()),
            client,
        }
    }

    pub fn from_config(config: &WebhookSinkConfig) -> Self {
        Self::new(config.url.clone(), Duration::from_secs(config.timeout_secs))
    }

    fn build_message(result: &ResultSet) -> WebhookMessage {
        let report = ScreenerReport::new(result);
        if result.stocks.is_empty() || result.is_aborted() {
            WebhookMessage::Text {
                text: WebhookContent {
                    content: report.to_chat_text(),
                },
            }
        } else {
            WebhookMessage::Markdown {
                markdown: WebhookContent {
                    content: report.to_chat_markdown(),
                },
            }
        }
    }

    async fn try_send(&self, url: &str, message: &WebhookMessage) -> Result<(), SinkError> {
        let response = self.client.post(url).json(message).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SinkError::Http(format!("HTTP {}: {}", status, error_text)));
        }

        let body: WebhookResponse = response.json().await?;
        match body.errcode {
            Some(0) => Ok(()),
            Some(code) => Err(SinkError::Rejected {
                code,
                message: body.errmsg,
            }),
            None => Err(SinkError::Http("response missing errcode".into())),
        }
    }
}

#[async_trait]
impl Sink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, result: &ResultSet) -> Result<SinkStatus, SinkError> {
        let Some(url) = self.url.as_deref() else {
            return Ok(SinkStatus::Skipped("webhook url not configured".into()));
        };

        let message = Self::build_message(result);
        self.try_send(url, &message).await?;

        tracing::info!(
            profile = %result.profile,
            stocks = result.stocks.len(),
            "Webhook message sent"
        );
        Ok(SinkStatus::Delivered)
    }
}
