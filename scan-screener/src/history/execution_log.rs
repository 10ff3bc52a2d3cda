//! Flat JSON log of scheduled and manual runs.

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const EXECUTION_LOG_FILE: &str = "execution_log.json";

/// Entries older than this are dropped on append.
pub const LOG_RETENTION_DAYS: i64 = 30;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_time: String,
    #[serde(default)]
    pub profile: String,
    pub success: bool,
    pub stocks_found: usize,
    #[serde(default)]
    pub email_sent: bool,
    /// "normal" or "error"
    #[serde(default)]
    pub system_status: String,
}

impl ExecutionRecord {
    /// Record stamped with the current local time.
    pub fn now(profile: &str, success: bool, stocks_found: usize, email_sent: bool) -> Self {
        Self {
            execution_time: Local::now().format(TIME_FORMAT).to_string(),
            profile: profile.to_string(),
            success,
            stocks_found,
            email_sent,
            system_status: if success { "normal" } else { "error" }.to_string(),
        }
    }

    fn executed_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.execution_time, TIME_FORMAT).ok()
    }
}

/// `<results_dir>/execution_log.json`
#[derive(Debug, Clone)]
pub struct ExecutionLog {
    path: PathBuf,
}

impl ExecutionLog {
    pub fn new(results_dir: &Path) -> Self {
        Self {
            path: results_dir.join(EXECUTION_LOG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, oldest first. A missing file is an empty log.
    pub fn entries(&self) -> Result<Vec<ExecutionRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    /// Append a record and drop entries past the retention window.
    pub fn append(&self, record: ExecutionRecord) -> Result<()> {
        let mut entries = match self.entries() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Execution log unreadable, starting fresh");
                Vec::new()
            }
        };
        entries.push(record);

        let cutoff = Local::now().naive_local() - Duration::days(LOG_RETENTION_DAYS);
        entries.retain(|e| e.executed_at().is_some_and(|t| t > cutoff));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&entries)?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        Ok(())
    }
}
