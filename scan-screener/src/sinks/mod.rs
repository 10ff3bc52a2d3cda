//! Output sinks.
//!
//! After a pass is persisted, its [`ResultSet`] is handed to every configured
//! sink in turn. A sink that fails or is misconfigured is logged and recorded;
//! the remaining sinks still run.

mod console;
mod email;
mod file;
mod webhook;

pub use console::ConsoleSink;
pub use email::EmailSink;
pub use file::FileSink;
pub use webhook::WebhookSink;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use scan_common::config::SinksConfig;

use crate::screener::ResultSet;

// ============================================================================
// Sink Trait
// ============================================================================

/// What a sink did with a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkStatus {
    Delivered,
    /// Not attempted, with the reason (e.g., missing credentials)
    Skipped(String),
}

/// Errors raised while delivering a result.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Rejected by receiver: errcode {code}: {message}")]
    Rejected { code: i64, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for SinkError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// Trait for result outputs.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Sink name for logs and the execution record
    fn name(&self) -> &'static str;

    async fn deliver(&self, result: &ResultSet) -> Result<SinkStatus, SinkError>;
}

// ============================================================================
// Dispatch
// ============================================================================

/// Outcome of one sink, as stored in the pass outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkReport {
    pub sink: String,
    /// "delivered", "skipped" or "failed"
    pub status: String,
    pub detail: Option<String>,
}

impl SinkReport {
    pub fn is_delivered(&self) -> bool {
        self.status == "delivered"
    }
}

/// Run every sink, isolating failures.
pub async fn dispatch(sinks: &[Box<dyn Sink>], result: &ResultSet) -> Vec<SinkReport> {
    let mut reports = Vec::with_capacity(sinks.len());

    for sink in sinks {
        let report = match sink.deliver(result).await {
            Ok(SinkStatus::Delivered) => {
                info!(sink = sink.name(), "Result delivered");
                SinkReport {
                    sink: sink.name().to_string(),
                    status: "delivered".into(),
                    detail: None,
                }
            }
            Ok(SinkStatus::Skipped(reason)) => {
                warn!(sink = sink.name(), reason = %reason, "Sink skipped");
                SinkReport {
                    sink: sink.name().to_string(),
                    status: "skipped".into(),
                    detail: Some(reason),
                }
            }
            Err(e) => {
                warn!(sink = sink.name(), error = %e, "Sink failed");
                SinkReport {
                    sink: sink.name().to_string(),
                    status: "failed".into(),
                    detail: Some(e.to_string()),
                }
            }
        };
        reports.push(report);
    }

    reports
}

/// Build the sinks enabled in config, in a fixed order.
pub fn build_sinks(config: &SinksConfig, results_dir: &Path) -> Vec<Box<dyn Sink>> {
    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();

    if config.console {
        sinks.push(Box::new(ConsoleSink::new()));
    }
    if config.file.enabled {
        sinks.push(Box::new(FileSink::from_config(&config.file, results_dir)));
    }
    if config.webhook.enabled {
        sinks.push(Box::new(WebhookSink::from_config(&config.webhook)));
    }
    if config.email.enabled {
        sinks.push(Box::new(EmailSink::from_config(&config.email)));
    }

    sinks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screener::FilterProfile;
    use chrono::Local;

    struct FailingSink;

    #[async_trait]
    impl Sink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn deliver(&self, _result: &ResultSet) -> Result<SinkStatus, SinkError> {
            Err(SinkError::Http("connection refused".into()))
        }
    }

    struct SkippingSink;

    #[async_trait]
    impl Sink for SkippingSink {
        fn name(&self) -> &'static str {
            "skipping"
        }

        async fn deliver(&self, _result: &ResultSet) -> Result<SinkStatus, SinkError> {
            Ok(SinkStatus::Skipped("not configured".into()))
        }
    }

    struct OkSink;

    #[async_trait]
    impl Sink for OkSink {
        fn name(&self) -> &'static str {
            "ok"
        }

        async fn deliver(&self, _result: &ResultSet) -> Result<SinkStatus, SinkError> {
            Ok(SinkStatus::Delivered)
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_other_sinks() {
        let result = ResultSet::new(&FilterProfile::default(), "2.0", Local::now());
        let sinks: Vec<Box<dyn Sink>> =
            vec![Box::new(FailingSink), Box::new(SkippingSink), Box::new(OkSink)];

        let reports = dispatch(&sinks, &result).await;
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].status, "failed");
        assert!(reports[0].detail.as_deref().unwrap().contains("refused"));
        assert_eq!(reports[1].status, "skipped");
        assert!(reports[2].is_delivered());
    }

    #[test]
    fn test_build_sinks_follows_config() {
        let mut config = SinksConfig::default();
        config.email.enabled = true;
        let sinks = build_sinks(&config, Path::new("/tmp"));
        let names: Vec<&str> = sinks.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["console", "file", "email"]);

        config.console = false;
        config.file.enabled = false;
        config.email.enabled = false;
        assert!(build_sinks(&config, Path::new("/tmp")).is_empty());
    }
}
