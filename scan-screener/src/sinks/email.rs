//! Email report sink.
//!
//! Renders the HTML report and checks the SMTP settings. No SMTP client is
//! bundled, so a fully configured sink still reports `Skipped` and leaves the
//! rendered body in the debug log.

use async_trait::async_trait;
use tracing::debug;

use scan_common::config::EmailSinkConfig;

use crate::screener::{ResultSet, ScreenerReport};

use super::{Sink, SinkError, SinkStatus};

/// Placeholder sink: it never sends mail.
///
/// `deliver` returns `Skipped` on every call, so `PassOutcome::email_sent`
/// and `ExecutionRecord::email_sent` stay `false` until a transport exists.
#[derive(Debug, Clone)]
pub struct EmailSink {
    config: EmailSinkConfig,
}

impl EmailSink {
    pub fn from_config(config: &EmailSinkConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Names of missing settings, empty when complete.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.config.smtp_server.as_deref().map_or(true, str::is_empty) {
            missing.push("smtp_server");
        }
        if self.config.sender.as_deref().map_or(true, str::is_empty) {
            missing.push("sender");
        }
        if self.config.password.as_deref().map_or(true, str::is_empty) {
            missing.push("password");
        }
        if self.config.recipients.is_empty() {
            missing.push("recipients");
        }
        missing
    }

    pub fn subject(result: &ResultSet) -> String {
        format!(
            "{} {} 选股结果 ({} 只)",
            result.screening_time,
            result.strategy_params.description,
            result.stocks.len()
        )
    }
}

#[async_trait]
impl Sink for EmailSink {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, result: &ResultSet) -> Result<SinkStatus, SinkError> {
        let missing = self.missing_settings();
        if !missing.is_empty() {
            return Ok(SinkStatus::Skipped(format!(
                "email settings incomplete: {}",
                missing.join(", ")
            )));
        }

        let body = ScreenerReport::new(result).to_html();
        debug!(
            subject = %Self::subject(result),
            recipients = self.config.recipients.len(),
            bytes = body.len(),
            "Email report rendered"
        );

        Ok(SinkStatus::Skipped("smtp transport not available".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screener::FilterProfile;
    use chrono::Local;

    #[tokio::test]
    async fn test_missing_settings_skip() {
        let sink = EmailSink::from_config(&EmailSinkConfig {
            enabled: true,
            ..Default::default()
        });
        assert_eq!(
            sink.missing_settings(),
            vec!["smtp_server", "sender", "password", "recipients"]
        );

        let result = ResultSet::new(&FilterProfile::default(), "2.0", Local::now());
        match sink.deliver(&result).await.unwrap() {
            SinkStatus::Skipped(reason) => assert!(reason.contains("smtp_server")),
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_complete_settings_still_skip() {
        let sink = EmailSink::from_config(&EmailSinkConfig {
            enabled: true,
            smtp_server: Some("smtp.qq.com".into()),
            smtp_port: 465,
            sender: Some("a@qq.com".into()),
            password: Some("secret".into()),
            recipients: vec!["b@qq.com".into()],
        });
        assert!(sink.missing_settings().is_empty());

        let result = ResultSet::new(&FilterProfile::default(), "2.0", Local::now());
        let sinks: Vec<Box<dyn Sink>> = vec![Box::new(sink)];
        let reports = crate::sinks::dispatch(&sinks, &result).await;
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].is_delivered());
        assert_eq!(reports[0].status, "skipped");
        assert!(reports[0]
            .detail
            .as_deref()
            .is_some_and(|d| d.contains("smtp transport")));
    }
}
