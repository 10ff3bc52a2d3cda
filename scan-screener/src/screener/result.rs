//! Persisted screening outcome.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::data::FetchStats;

use super::filter::FilterResult;
use super::profile::{FilterProfile, ScoreWeights};
use super::scorer::ScoredCandidate;

/// Prefix shared by every result file.
pub const RESULT_FILE_PREFIX: &str = "screening_result_";

/// Reference index reading taken before the pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub code: String,
    pub name: String,
    pub price: f64,
    pub change_percent: f64,
    /// Threshold the reading was judged against
    pub risk_threshold: Option<f64>,
    /// Whether the pass was allowed to continue
    pub safe: bool,
}

/// One screening pass. Written once, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSet {
    /// Screening ID (timestamp-based)
    pub id: String,
    /// Local time, `%Y-%m-%d %H:%M:%S`
    pub screening_time: String,
    pub started_at: DateTime<Local>,
    pub profile: String,
    pub strategy_version: String,
    pub scoring_weights: ScoreWeights,
    pub strategy_params: FilterProfile,
    /// Symbols in the universe after exclusions
    pub total_scanned: usize,
    /// Quotes returned by the provider
    #[serde(default)]
    pub total_fetched: usize,
    /// Candidates above the score floor, before truncation
    pub total_stocks_found: usize,
    /// Top-N, best first
    pub stocks: Vec<ScoredCandidate>,
    pub stage_stats: Vec<FilterResult>,
    pub fetch_stats: FetchStats,
    pub market: Option<MarketSnapshot>,
    /// Set when the pass stopped before screening
    pub aborted_reason: Option<String>,
    pub duration_secs: f64,
}

impl ResultSet {
    /// Empty result for a pass started at `started_at`.
    pub fn new(profile: &FilterProfile, strategy_version: &str, started_at: DateTime<Local>) -> Self {
        Self {
            id: format!("scan_{}", started_at.format("%Y%m%d_%H%M%S")),
            screening_time: started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            started_at,
            profile: profile.name.clone(),
            strategy_version: strategy_version.to_string(),
            scoring_weights: profile.weights,
            strategy_params: profile.clone(),
            total_scanned: 0,
            total_fetched: 0,
            total_stocks_found: 0,
            stocks: Vec::new(),
            stage_stats: Vec::new(),
            fetch_stats: FetchStats::default(),
            market: None,
            aborted_reason: None,
            duration_secs: 0.0,
        }
    }

    /// `screening_result_<profile>_<YYYYmmdd_HHMMSS>.json`
    pub fn file_name(&self) -> String {
        format!(
            "{}{}_{}.json",
            RESULT_FILE_PREFIX,
            self.profile,
            self.started_at.format("%Y%m%d_%H%M%S")
        )
    }

    /// Write the result as pretty JSON into `dir`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create results dir {}", dir.display()))?;

        let path = dir.join(self.file_name());
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Get the top N stocks by score.
    pub fn top(&self, n: usize) -> Vec<&ScoredCandidate> {
        self.stocks.iter().take(n).collect()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted_reason.is_some()
    }

    /// Summary string for logging.
    pub fn summary(&self) -> String {
        if let Some(reason) = &self.aborted_reason {
            return format!("[{}] Pass aborted: {}", self.profile, reason);
        }
        format!(
            "[{}] Screened {} stocks in {:.1}s: {} found, top {} kept ({:.1}%)",
            self.profile,
            self.total_scanned,
            self.duration_secs,
            self.total_stocks_found,
            self.stocks.len(),
            if self.total_scanned > 0 {
                (self.total_stocks_found as f64 / self.total_scanned as f64) * 100.0
            } else {
                0.0
            }
        )
    }
}
