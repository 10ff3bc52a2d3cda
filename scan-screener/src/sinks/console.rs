//! Ranked table on stdout.

use async_trait::async_trait;
use std::io::Write;

use crate::screener::{ReportFormat, ResultSet, ScreenerReport};

use super::{Sink, SinkError, SinkStatus};

#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn deliver(&self, result: &ResultSet) -> Result<SinkStatus, SinkError> {
        let table = ScreenerReport::new(result).generate(ReportFormat::Text);
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(table.as_bytes())?;
        stdout.flush()?;
        Ok(SinkStatus::Delivered)
    }
}
