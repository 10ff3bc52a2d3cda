//! Screening engine.
//!
//! One pass runs: market gate, universe, fetch, filter, score, rank,
//! persist, then fan-out to sinks.

use anyhow::{Context, Result};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use scan_common::config::Config;
use scan_common::logging::generate_trace_id;

use crate::data::{
    filter_universe, Fetcher, MarketQuote, QuoteSource, UniverseFilter, UniverseSource,
};
use crate::sinks::{dispatch, Sink, SinkReport};

use super::filter::QuoteFilter;
use super::profile::FilterProfile;
use super::ranker::rank;
use super::result::{MarketSnapshot, ResultSet};
use super::scorer::Scorer;

// ============================================================================
// Engine Settings
// ============================================================================

/// Pass settings that do not belong to a profile.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub inflow_fraction: f64,
    pub strategy_version: String,
    pub results_dir: PathBuf,
    /// Reference index codes, first one with data wins
    pub index_codes: Vec<String>,
    pub exclude_beijing: bool,
    pub pass_timeout: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            inflow_fraction: config.screening.inflow_fraction,
            strategy_version: config.screening.strategy_version.clone(),
            results_dir: config.results_dir(),
            index_codes: config.provider.index_codes.clone(),
            exclude_beijing: config.universe.exclude_beijing,
            pass_timeout: Duration::from_secs(config.screening.pass_timeout_secs),
        }
    }
}

/// A finished pass.
#[derive(Debug)]
pub struct PassOutcome {
    pub result: ResultSet,
    pub result_path: PathBuf,
    pub sink_reports: Vec<SinkReport>,
}

impl PassOutcome {
    /// True only when an email sink reported `Delivered`. The bundled
    /// [`EmailSink`](crate::sinks::EmailSink) never does.
    pub fn email_sent(&self) -> bool {
        self.sink_reports
            .iter()
            .any(|r| r.sink == "email" && r.is_delivered())
    }
}

// ============================================================================
// Screening Engine
// ============================================================================

pub struct ScreeningEngine<S: QuoteSource + ?Sized, U: UniverseSource + ?Sized> {
    fetcher: Fetcher<S>,
    universe: Arc<U>,
    settings: EngineSettings,
    sinks: Vec<Box<dyn Sink>>,
}

impl<S: QuoteSource + ?Sized, U: UniverseSource + ?Sized> ScreeningEngine<S, U> {
    pub fn new(fetcher: Fetcher<S>, universe: Arc<U>, settings: EngineSettings) -> Self {
        Self {
            fetcher,
            universe,
            settings,
            sinks: Vec::new(),
        }
    }

    pub fn with_sinks(mut self, sinks: Vec<Box<dyn Sink>>) -> Self {
        self.sinks = sinks;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one pass under the pass deadline, then persist and deliver.
    ///
    /// A pass stopped by the market gate is still saved and delivered.
    pub async fn run(&self, profile: &FilterProfile) -> Result<PassOutcome> {
        let started_at = Local::now();
        let timer = Instant::now();
        let trace_id = generate_trace_id();

        info!(
            trace_id = %trace_id,
            profile = %profile.name,
            source = self.fetcher.source_name(),
            universe = self.universe.name(),
            "Starting screening pass"
        );

        let mut result =
            match tokio::time::timeout(self.settings.pass_timeout, self.screen(profile, started_at))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    warn!(
                        profile = %profile.name,
                        timeout_secs = self.settings.pass_timeout.as_secs(),
                        "Screening pass timed out"
                    );
                    return Err(scan_common::Error::Timeout(self.settings.pass_timeout.as_secs()).into());
                }
            };

        result.duration_secs = timer.elapsed().as_secs_f64();

        let result_path = result
            .save(&self.settings.results_dir)
            .context("Failed to save screening result")?;

        info!(
            trace_id = %trace_id,
            scan_id = %result.id,
            path = %result_path.display(),
            stocks = result.stocks.len(),
            duration = format!("{:.1}s", result.duration_secs),
            "{}",
            result.summary()
        );

        let sink_reports = dispatch(&self.sinks, &result).await;

        Ok(PassOutcome {
            result,
            result_path,
            sink_reports,
        })
    }

    /// Everything up to the ranked list; no side effects besides logging.
    async fn screen(
        &self,
        profile: &FilterProfile,
        started_at: chrono::DateTime<Local>,
    ) -> Result<ResultSet> {
        let mut result = ResultSet::new(profile, &self.settings.strategy_version, started_at);
        self.fetcher.reset_stats();

        // Phase 1: Market gate
        if let Some(threshold) = profile.index_risk_threshold {
            match self.fetcher.fetch_index(&self.settings.index_codes).await {
                Some(index) => {
                    let snapshot = market_snapshot(&index, threshold);
                    info!(
                        index = %snapshot.code,
                        change = format!("{:.2}%", snapshot.change_percent),
                        threshold,
                        safe = snapshot.safe,
                        "Market gate checked"
                    );
                    if !snapshot.safe {
                        result.aborted_reason = Some(format!(
                            "index {} change {:.2}% below risk threshold {:.2}%",
                            snapshot.code, snapshot.change_percent, threshold
                        ));
                        result.market = Some(snapshot);
                        result.fetch_stats = self.fetcher.stats();
                        warn!(profile = %profile.name, "Market unsafe, pass aborted");
                        return Ok(result);
                    }
                    result.market = Some(snapshot);
                }
                None => warn!("No index data, skipping market gate"),
            }
        }

        // Phase 2: Universe
        let entries = self
            .universe
            .load()
            .await
            .with_context(|| format!("Failed to load universe from {}", self.universe.name()))?;
        let (entries, removed) = filter_universe(
            entries,
            &UniverseFilter {
                exclude_special_treatment: profile.exclude_special_treatment,
                exclude_beijing: self.settings.exclude_beijing,
                exclude_star: profile.exclude_star_market,
            },
        );
        let symbols: Vec<String> = entries.into_iter().map(|e| e.symbol).collect();
        result.total_scanned = symbols.len();
        info!(symbols = symbols.len(), removed, "Universe loaded");

        // Phase 3: Fetch
        let quotes = self.fetcher.fetch_all(&symbols).await;
        result.total_fetched = quotes.len();
        result.fetch_stats = self.fetcher.stats();
        info!(
            requested = symbols.len(),
            fetched = result.total_fetched,
            batches = result.fetch_stats.total_calls,
            failed_batches = result.fetch_stats.failed_calls,
            success_rate = format!("{:.1}%", result.fetch_stats.success_rate()),
            "Fetch phase complete"
        );

        // Phase 4: Filter
        let filter = QuoteFilter::new(profile.clone(), self.settings.inflow_fraction);
        let outcome = filter.filter_all(quotes);
        for stage in &outcome.stage_results {
            info!(
                stage = %stage.stage,
                passed = stage.passed,
                eliminated = stage.eliminated,
                "Filter stage"
            );
        }
        result.stage_stats = outcome.stage_results;

        // Phase 5: Score and rank
        let scored = Scorer::for_profile(profile).score_all(&outcome.passed);
        result.total_stocks_found = scored.len();
        result.stocks = rank(scored, profile.top_n);

        Ok(result)
    }
}

fn market_snapshot(index: &MarketQuote, threshold: f64) -> MarketSnapshot {
    MarketSnapshot {
        code: index.symbol.clone(),
        name: index.name.clone(),
        price: index.price,
        change_percent: index.change_percent,
        risk_threshold: Some(threshold),
        safe: index.change_percent >= threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        FetchOptions, ProviderError, QuoteBatch, SyntheticSource, SyntheticUniverse,
    };
    use async_trait::async_trait;
    use tempfile::TempDir;

    fn create_test_settings(dir: &TempDir) -> EngineSettings {
        EngineSettings {
            inflow_fraction: 0.3,
            strategy_version: "2.0".into(),
            results_dir: dir.path().to_path_buf(),
            index_codes: vec!["sh000001".into()],
            exclude_beijing: true,
            pass_timeout: Duration::from_secs(30),
        }
    }

    fn create_test_engine(
        source: SyntheticSource,
        dir: &TempDir,
    ) -> ScreeningEngine<SyntheticSource, SyntheticUniverse> {
        ScreeningEngine::new(
            Fetcher::new(Arc::new(source), FetchOptions::immediate(50)),
            Arc::new(SyntheticUniverse::new(200)),
            create_test_settings(dir),
        )
    }

    #[tokio::test]
    async fn test_full_pass_is_persisted() {
        let dir = TempDir::new().unwrap();
        let engine = create_test_engine(SyntheticSource::new(11), &dir);
        let profile = FilterProfile::quick_knife();

        let outcome = engine.run(&profile).await.unwrap();
        let result = &outcome.result;

        // 200 generated, Beijing (830xxx) and STAR (688xxx) removed
        assert_eq!(result.total_scanned, 120);
        assert_eq!(result.total_fetched, 120);
        assert_eq!(result.fetch_stats.total_calls, 3);
        assert!(!result.stage_stats.is_empty());
        assert!(result.stocks.len() <= profile.top_n);
        assert!(result.total_stocks_found >= result.stocks.len());
        assert!(result
            .stocks
            .windows(2)
            .all(|w| w[0].total_score >= w[1].total_score));
        assert!(result.stocks.iter().all(|c| c.total_score >= profile.score_floor));

        assert!(outcome.result_path.exists());
        let loaded = ResultSet::load(&outcome.result_path).unwrap();
        assert_eq!(loaded.stocks.len(), result.stocks.len());
        assert!(outcome.sink_reports.is_empty());
        assert!(!outcome.email_sent());
    }

    #[tokio::test]
    async fn test_unsafe_market_aborts_but_saves() {
        let dir = TempDir::new().unwrap();
        let engine = create_test_engine(SyntheticSource::new(11).with_index_change(-2.5), &dir);
        let profile = FilterProfile {
            index_risk_threshold: Some(-1.5),
            ..FilterProfile::burial_1450()
        };

        let outcome = engine.run(&profile).await.unwrap();
        let result = &outcome.result;

        assert!(result.is_aborted());
        assert!(result.stocks.is_empty());
        assert_eq!(result.total_scanned, 0);
        let market = result.market.as_ref().unwrap();
        assert!(!market.safe);
        assert_eq!(market.change_percent, -2.5);
        assert!(outcome.result_path.exists());
    }

    #[tokio::test]
    async fn test_safe_market_continues() {
        let dir = TempDir::new().unwrap();
        let engine = create_test_engine(SyntheticSource::new(11).with_index_change(-0.5), &dir);
        let profile = FilterProfile {
            index_risk_threshold: Some(-1.5),
            ..FilterProfile::burial_1450()
        };

        let result = engine.run(&profile).await.unwrap().result;
        assert!(!result.is_aborted());
        assert!(result.market.as_ref().unwrap().safe);
        assert!(result.total_scanned > 0);
    }

    struct StalledSource;

    #[async_trait]
    impl QuoteSource for StalledSource {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn fetch_batch(&self, _symbols: &[String]) -> Result<QuoteBatch, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(QuoteBatch::default())
        }

        async fn fetch_index(&self, _code: &str) -> Result<Option<MarketQuote>, ProviderError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_pass_timeout() {
        let dir = TempDir::new().unwrap();
        let mut settings = create_test_settings(&dir);
        settings.pass_timeout = Duration::from_millis(50);

        let engine = ScreeningEngine::new(
            Fetcher::new(Arc::new(StalledSource), FetchOptions::immediate(50)),
            Arc::new(SyntheticUniverse::new(10)),
            settings,
        );

        let err = engine.run(&FilterProfile::default()).await.unwrap_err();
        let err = err.downcast_ref::<scan_common::Error>().unwrap();
        assert!(err.is_timeout());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
