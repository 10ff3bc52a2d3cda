//! Intraday Screener Module.
//!
//! Turns a batch of realtime quotes into a short ranked list of candidates
//! for one named filter profile.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      日内选股流水线                                   │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────┐           │
//! │  │  大盘风控   │────▶│  股票池     │────▶│  批量行情   │           │
//! │  │ Market Gate │     │  Universe   │     │  Fetcher    │           │
//! │  └─────────────┘     └─────────────┘     └──────┬──────┘           │
//! │                                                 │                   │
//! │  ┌──────────────────────────────────────────────┴───────┐          │
//! │  │              Quote Filter (short-circuit)            │          │
//! │  │  - Price, ST/STAR, estimated cap                     │          │
//! │  │  - Change band, turnover rule, amount, VWAP shape    │          │
//! │  │  - Volume ratio, estimated inflow                    │          │
//! │  └──────────────────────────────────────────────┬───────┘          │
//! │                                                 ▼                   │
//! │                  Scorer ──▶ Ranker ──▶ ResultSet ──▶ Sinks          │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use scan_screener::screener::{EngineSettings, ProfileRegistry, ScreeningEngine};
//!
//! let registry = ProfileRegistry::load(Some(config.profiles_path().as_path()))?;
//! let profile = registry.resolve("burial-1450")?;
//! let engine = ScreeningEngine::new(fetcher, universe, EngineSettings::from_config(&config));
//!
//! let outcome = engine.run(profile).await?;
//! ```

pub mod capitalization;
pub mod engine;
pub mod filter;
pub mod profile;
pub mod ranker;
pub mod report;
pub mod result;
pub mod scorer;

pub use capitalization::{estimate_cap, CapEstimate};
pub use engine::{EngineSettings, PassOutcome, ScreeningEngine};
pub use filter::{FilterOutcome, FilterResult, FilterStage, FilteredQuote, QuoteFilter};
pub use profile::{
    Band, CapTier, CapTiers, FilterProfile, ProfileRegistry, ScoreWeights, TurnoverRule,
    DEFAULT_PROFILE,
};
pub use ranker::rank;
pub use report::{ReportFormat, ScreenerReport};
pub use result::{MarketSnapshot, ResultSet, RESULT_FILE_PREFIX};
pub use scorer::{ScoreBreakdown, ScoredCandidate, Scorer};
