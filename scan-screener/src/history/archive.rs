//! Read side of the results directory.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::screener::{ResultSet, RESULT_FILE_PREFIX};

/// How often a symbol made the final list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionStat {
    pub symbol: String,
    pub name: String,
    pub times_selected: usize,
    pub avg_score: f64,
    pub best_score: f64,
    /// Screening time of the most recent selection
    pub last_selected: String,
}

/// Result files under one directory.
#[derive(Debug, Clone)]
pub struct ResultArchive {
    dir: PathBuf,
}

impl ResultArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Result file paths, newest first.
    ///
    /// File names embed the start time, but profiles differ in length, so
    /// ordering uses the timestamp suffix rather than the whole name.
    pub fn result_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut files: Vec<(String, PathBuf)> = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list {}", self.dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter_map(|path| {
                let stem = path.file_stem()?.to_str()?.to_string();
                let is_result = stem.starts_with(RESULT_FILE_PREFIX)
                    && path.extension().is_some_and(|ext| ext == "json");
                is_result.then(|| (timestamp_key(&stem), path))
            })
            .collect();

        files.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    /// Load up to `limit` newest results, skipping unreadable files.
    pub fn latest(&self, limit: usize) -> Result<Vec<ResultSet>> {
        let mut results = Vec::new();
        for path in self.result_files()? {
            if results.len() >= limit {
                break;
            }
            match ResultSet::load(&path) {
                Ok(result) => results.push(result),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping result file"),
            }
        }
        Ok(results)
    }

    /// Selection frequency across the last `limit` results, most frequent first.
    pub fn selection_stats(&self, limit: usize) -> Result<Vec<SelectionStat>> {
        let results = self.latest(limit)?;
        Ok(aggregate(&results))
    }
}

/// `<prefix><profile>_<YYYYmmdd>_<HHMMSS>` -> `<YYYYmmdd>_<HHMMSS>`
fn timestamp_key(stem: &str) -> String {
    let parts: Vec<&str> = stem.rsplitn(3, '_').collect();
    match parts.as_slice() {
        [time, date, _] => format!("{}_{}", date, time),
        _ => stem.to_string(),
    }
}

fn aggregate(results: &[ResultSet]) -> Vec<SelectionStat> {
    struct Acc {
        name: String,
        count: usize,
        total: f64,
        best: f64,
        last: String,
    }

    let mut by_symbol: HashMap<String, Acc> = HashMap::new();

    // Newest first, so the first sighting is the latest.
    for result in results {
        for c in &result.stocks {
            let acc = by_symbol.entry(c.quote.symbol.clone()).or_insert_with(|| Acc {
                name: c.quote.name.clone(),
                count: 0,
                total: 0.0,
                best: f64::MIN,
                last: result.screening_time.clone(),
            });
            acc.count += 1;
            acc.total += c.total_score;
            acc.best = acc.best.max(c.total_score);
        }
    }

    let mut stats: Vec<SelectionStat> = by_symbol
        .into_iter()
        .map(|(symbol, acc)| SelectionStat {
            symbol,
            name: acc.name,
            times_selected: acc.count,
            avg_score: acc.total / acc.count as f64,
            best_score: acc.best,
            last_selected: acc.last,
        })
        .collect();

    stats.sort_by(|a, b| {
        b.times_selected
            .cmp(&a.times_selected)
            .then_with(|| {
                b.avg_score
                    .partial_cmp(&a.avg_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MarketQuote, RawQuote};
    use crate::screener::{FilterProfile, ScoreBreakdown, ScoredCandidate};
    use chrono::{Local, TimeZone};
    use tempfile::TempDir;

    fn candidate(symbol: &str, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            quote: MarketQuote::from_raw(RawQuote {
                symbol: symbol.to_string(),
                name: format!("N{}", symbol),
                ..Default::default()
            }),
            estimated_cap: None,
            cap_tier: None,
            turnover_range: String::new(),
            amount_yi: 0.0,
            price_position: 0.0,
            amplitude: 0.0,
            scores: ScoreBreakdown::default(),
            total_score: score,
        }
    }

    fn create_test_result(profile: FilterProfile, hour: u32, picks: &[(&str, f64)]) -> ResultSet {
        let started = Local.with_ymd_and_hms(2026, 3, 2, hour, 30, 0).unwrap();
        let mut r = ResultSet::new(&profile, "2.0", started);
        r.stocks = picks.iter().map(|(s, score)| candidate(s, *score)).collect();
        r
    }

    #[test]
    fn test_latest_orders_by_time_across_profiles() {
        let dir = TempDir::new().unwrap();
        create_test_result(FilterProfile::midday_1130(), 11, &[("600000", 80.0)])
            .save(dir.path())
            .unwrap();
        let newest = create_test_result(FilterProfile::burial_1430(), 14, &[("000001", 70.0)]);
        newest.save(dir.path()).unwrap();
        fs::write(dir.path().join("execution_log.json"), "[]").unwrap();
        fs::write(dir.path().join("screening_result_bad_20260101_000000.json"), "{").unwrap();

        let archive = ResultArchive::new(dir.path());
        let files = archive.result_files().unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|p| p.parent() == Some(dir.path())));

        let latest = archive.latest(10).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].id, newest.id);

        assert_eq!(archive.latest(1).unwrap().len(), 1);
    }

    #[test]
    fn test_selection_stats() {
        let dir = TempDir::new().unwrap();
        create_test_result(
            FilterProfile::burial_1450(),
            10,
            &[("600000", 60.0), ("000001", 90.0)],
        )
        .save(dir.path())
        .unwrap();
        create_test_result(FilterProfile::burial_1450(), 14, &[("600000", 80.0)])
            .save(dir.path())
            .unwrap();

        let stats = ResultArchive::new(dir.path()).selection_stats(5).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].symbol, "600000");
        assert_eq!(stats[0].times_selected, 2);
        assert!((stats[0].avg_score - 70.0).abs() < 1e-9);
        assert_eq!(stats[0].best_score, 80.0);
        assert_eq!(stats[0].last_selected, "2026-03-02 14:30:00");
        assert_eq!(stats[1].symbol, "000001");
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let archive = ResultArchive::new("/nonexistent/results");
        assert!(archive.latest(5).unwrap().is_empty());
    }

    #[test]
    fn test_timestamp_key() {
        assert_eq!(
            timestamp_key("screening_result_burial-1450_20260302_145005"),
            "20260302_145005"
        );
    }
}
