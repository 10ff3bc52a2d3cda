//! Human-readable mirror next to the JSON result.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use scan_common::config::FileSinkConfig;

use crate::screener::{ReportFormat, ResultSet, ScreenerReport};

use super::{Sink, SinkError, SinkStatus};

/// Writes `<result stem>.md` or `<result stem>.txt` into the results dir.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
    format: ReportFormat,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, format: ReportFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    /// Unknown formats fall back to Markdown.
    pub fn from_config(config: &FileSinkConfig, results_dir: &Path) -> Self {
        let format = match config.format.parse::<ReportFormat>() {
            Ok(f @ (ReportFormat::Markdown | ReportFormat::Text)) => f,
            _ => ReportFormat::Markdown,
        };
        Self::new(results_dir, format)
    }

    pub fn path_for(&self, result: &ResultSet) -> PathBuf {
        self.dir
            .join(result.file_name())
            .with_extension(self.format.extension())
    }
}

#[async_trait]
impl Sink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn deliver(&self, result: &ResultSet) -> Result<SinkStatus, SinkError> {
        let path = ScreenerReport::new(result).save_to_file(&self.path_for(result), self.format)?;
        debug!(path = %path.display(), "Report mirror written");
        Ok(SinkStatus::Delivered)
    }
}
