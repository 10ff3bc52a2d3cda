//! Hard filters.
//!
//! Each quote walks an ordered sequence of range checks and stops at the first
//! failure. The stage it failed at is returned so a pass can report where the
//! universe was eliminated:
//!
//! 1. Price within bounds
//! 2. Not special treatment, not an excluded board
//! 3. Estimated capitalization within bounds
//! 4. Change % within bounds
//! 5. Turnover within the rule for the cap tier
//! 6. Traded amount at or above the minimum
//! 7. |Deviation| at or below the maximum
//! 8. Price at or above VWAP
//! 9. Price at or above open
//! 10. Price near the day's high
//! 11. Volume ratio within bounds
//! 12. Estimated main-force inflow

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::{is_star_code, MarketQuote};

use super::capitalization::CapEstimate;
use super::profile::FilterProfile;

// ============================================================================
// Filter Stage
// ============================================================================

/// Filter stage identifier for tracking where stocks are eliminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    Price,
    SpecialTreatment,
    MarketCap,
    Change,
    Turnover,
    Amount,
    Deviation,
    AboveVwap,
    AboveOpen,
    NearHigh,
    VolumeRatio,
    Inflow,
}

impl FilterStage {
    /// Evaluation order.
    pub const ALL: [FilterStage; 12] = [
        Self::Price,
        Self::SpecialTreatment,
        Self::MarketCap,
        Self::Change,
        Self::Turnover,
        Self::Amount,
        Self::Deviation,
        Self::AboveVwap,
        Self::AboveOpen,
        Self::NearHigh,
        Self::VolumeRatio,
        Self::Inflow,
    ];

    /// Whether the profile configures this stage at all.
    pub fn is_active(&self, profile: &FilterProfile) -> bool {
        match self {
            // Price > 0, positive turnover and positive amount are always required
            Self::Price | Self::Turnover | Self::Amount => true,
            Self::SpecialTreatment => {
                profile.exclude_special_treatment || profile.exclude_star_market
            }
            Self::MarketCap => profile.min_cap.is_some() || profile.max_cap.is_some(),
            Self::Change => profile.min_change.is_some() || profile.max_change.is_some(),
            Self::Deviation => profile.max_deviation.is_some(),
            Self::AboveVwap => profile.require_above_vwap,
            Self::AboveOpen => profile.require_above_open,
            Self::NearHigh => profile.near_high_ratio.is_some(),
            Self::VolumeRatio => {
                profile.min_volume_ratio.is_some() || profile.max_volume_ratio.is_some()
            }
            Self::Inflow => profile.min_inflow.is_some() || profile.min_inflow_ratio.is_some(),
        }
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Price => write!(f, "价格"),
            Self::SpecialTreatment => write!(f, "ST/板块排除"),
            Self::MarketCap => write!(f, "市值"),
            Self::Change => write!(f, "涨幅"),
            Self::Turnover => write!(f, "换手率"),
            Self::Amount => write!(f, "成交额"),
            Self::Deviation => write!(f, "乖离率"),
            Self::AboveVwap => write!(f, "均价线上方"),
            Self::AboveOpen => write!(f, "阳线"),
            Self::NearHigh => write!(f, "接近最高价"),
            Self::VolumeRatio => write!(f, "量比"),
            Self::Inflow => write!(f, "主力资金"),
        }
    }
}

// ============================================================================
// Filter Result
// ============================================================================

/// Result of a filtering stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    /// Stage name
    pub stage: FilterStage,
    /// Number of stocks that passed this stage
    pub passed: usize,
    /// Number of stocks eliminated at this stage
    pub eliminated: usize,
    /// Elimination rate (%)
    pub elimination_rate: f64,
}

impl FilterResult {
    pub fn new(stage: FilterStage, input_count: usize, passed_count: usize) -> Self {
        let eliminated = input_count.saturating_sub(passed_count);
        let elimination_rate = if input_count > 0 {
            (eliminated as f64 / input_count as f64) * 100.0
        } else {
            0.0
        };

        Self {
            stage,
            passed: passed_count,
            eliminated,
            elimination_rate,
        }
    }
}

/// A quote that passed every stage, with its capitalization estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredQuote {
    pub quote: MarketQuote,
    pub cap: Option<CapEstimate>,
}

/// Survivors of [`QuoteFilter::filter_all`] plus per-stage statistics.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// In input order
    pub passed: Vec<FilteredQuote>,
    /// Active stages in evaluation order
    pub stage_results: Vec<FilterResult>,
}

// ============================================================================
// Quote Filter
// ============================================================================

/// Conjunctive, short-circuiting filter over one profile.
#[derive(Debug, Clone)]
pub struct QuoteFilter {
    profile: FilterProfile,
    inflow_fraction: f64,
}

impl QuoteFilter {
    /// `inflow_fraction` is the share of traded amount attributed to main-force
    /// buying when estimating inflow.
    pub fn new(profile: FilterProfile, inflow_fraction: f64) -> Self {
        Self {
            profile,
            inflow_fraction,
        }
    }

    pub fn profile(&self) -> &FilterProfile {
        &self.profile
    }

    /// Run every stage in order; `Err` names the first failing stage.
    pub fn evaluate(&self, quote: &MarketQuote) -> Result<Option<CapEstimate>, FilterStage> {
        let p = &self.profile;

        // 1. Price
        if quote.price <= 0.0
            || p.min_price.map_or(false, |min| quote.price < min)
            || p.max_price.map_or(false, |max| quote.price > max)
        {
            return Err(FilterStage::Price);
        }

        // 2. Special treatment / board
        if (p.exclude_special_treatment && quote.is_special_treatment())
            || (p.exclude_star_market && is_star_code(&quote.symbol))
        {
            return Err(FilterStage::SpecialTreatment);
        }

        // 3. Capitalization; the estimate uses the raw amount
        let cap = CapEstimate::from_quote_fields(quote.amount, quote.turnover_rate, &p.cap_tiers);
        if FilterStage::MarketCap.is_active(p) {
            let in_bounds = cap.map_or(false, |c| {
                p.min_cap.map_or(true, |min| c.value >= min)
                    && p.max_cap.map_or(true, |max| c.value <= max)
            });
            if !in_bounds {
                return Err(FilterStage::MarketCap);
            }
        }

        // 4. Change
        if !p.change_in_bounds(quote.change_percent) {
            return Err(FilterStage::Change);
        }

        // 5. Turnover; zero or missing never passes
        let turnover_ok = match quote.turnover_rate {
            Some(t) if t > 0.0 => p.turnover.accepts(t, cap.map(|c| c.tier)),
            _ => false,
        };
        if !turnover_ok {
            return Err(FilterStage::Turnover);
        }

        // 6. Amount
        let amount = quote.effective_amount();
        if amount <= 0.0 || p.min_amount.map_or(false, |min| amount < min) {
            return Err(FilterStage::Amount);
        }

        // 7. Deviation
        if p.max_deviation.map_or(false, |max| quote.deviation.abs() > max) {
            return Err(FilterStage::Deviation);
        }

        // 8-10. Candle shape
        if p.require_above_vwap && quote.price < quote.vwap {
            return Err(FilterStage::AboveVwap);
        }
        if p.require_above_open && quote.price < quote.open {
            return Err(FilterStage::AboveOpen);
        }
        if p.near_high_ratio.map_or(false, |r| quote.price < quote.high * r) {
            return Err(FilterStage::NearHigh);
        }

        // 11. Volume ratio; missing fails when bounded
        if FilterStage::VolumeRatio.is_active(p) {
            let ok = quote.volume_ratio.map_or(false, |vr| {
                p.min_volume_ratio.map_or(true, |min| vr >= min)
                    && p.max_volume_ratio.map_or(true, |max| vr <= max)
            });
            if !ok {
                return Err(FilterStage::VolumeRatio);
            }
        }

        // 12. Inflow
        let inflow = self.estimated_inflow(quote);
        if p.min_inflow.map_or(false, |min| inflow < min)
            || p.min_inflow_ratio.map_or(false, |min| inflow / amount < min)
        {
            return Err(FilterStage::Inflow);
        }

        Ok(cap)
    }

    /// Main-force inflow approximated as a fixed share of traded amount.
    pub fn estimated_inflow(&self, quote: &MarketQuote) -> f64 {
        quote.effective_amount() * self.inflow_fraction
    }

    /// Filter a batch, keeping input order and counting eliminations per stage.
    pub fn filter_all(&self, quotes: Vec<MarketQuote>) -> FilterOutcome {
        let input_count = quotes.len();
        let mut rejected = [0usize; FilterStage::ALL.len()];
        let mut passed = Vec::new();

        for quote in quotes {
            match self.evaluate(&quote) {
                Ok(cap) => passed.push(FilteredQuote { quote, cap }),
                Err(stage) => rejected[stage as usize] += 1,
            }
        }

        let mut remaining = input_count;
        let stage_results = FilterStage::ALL
            .iter()
            .filter(|stage| stage.is_active(&self.profile))
            .map(|stage| {
                let after = remaining - rejected[*stage as usize];
                let result = FilterResult::new(*stage, remaining, after);
                remaining = after;
                result
            })
            .collect();

        FilterOutcome {
            passed,
            stage_results,
        }
    }
}
