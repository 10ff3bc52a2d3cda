//! Market data module for A-shares.
//!
//! Provides the normalized quote type, quote sources, the stock universe and
//! the batching fetcher.
//!
//! # Data Sources
//! - **Gugudata** (Primary): realtime REST API, batched by comma-joined symbols
//! - **Synthetic**: deterministic generated quotes for offline runs and tests
//! - **Tushare** (Universe only): listed A-share codes and names
//!
//! # Units
//! Volume is in lots of 100 shares and amount is in yuan, so
//! `vwap = amount / (volume * 100)`.

mod fetcher;
mod gugudata;
mod provider;
mod synthetic;
mod universe;

pub use fetcher::{FetchOptions, FetchStats, Fetcher};
pub use gugudata::GugudataSource;
pub use provider::{ProviderError, QuoteBatch, QuoteSource};
pub use synthetic::{SyntheticSource, SyntheticUniverse};
pub use universe::{
    filter_universe, StaticUniverse, TushareUniverse, UniverseEntry, UniverseFilter,
    UniverseSource,
};

use serde::{Deserialize, Serialize};

/// Shares per lot on the A-share market.
pub const SHARES_PER_LOT: f64 = 100.0;

// ============================================================================
// Raw Quote
// ============================================================================

/// Provider-neutral quote fields before derived values are computed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawQuote {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub pre_close: f64,
    /// Lots
    pub volume: f64,
    /// Yuan
    pub amount: f64,
    /// Percent of free float
    pub turnover_rate: Option<f64>,
    pub volume_ratio: Option<f64>,
    /// Percent; `None` or `0` falls back to the pre-close computation
    pub change_percent: Option<f64>,
}

// ============================================================================
// Market Quote
// ============================================================================

/// One symbol's snapshot at fetch time.
///
/// Built once through [`MarketQuote::from_raw`], which derives VWAP and
/// deviation; not mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    /// Six-digit code (e.g., "600000")
    pub symbol: String,
    pub name: String,
    /// Last traded price
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub pre_close: f64,
    /// Traded volume in lots
    pub volume: f64,
    /// Traded amount in yuan
    pub amount: f64,
    /// Turnover rate (%)
    pub turnover_rate: Option<f64>,
    /// Volume ratio vs. recent average
    pub volume_ratio: Option<f64>,
    /// Change vs. previous close (%)
    pub change_percent: f64,
    /// Session VWAP, falls back to `price` when volume is zero
    pub vwap: f64,
    /// (price - vwap) / vwap * 100, zero when vwap <= 0
    pub deviation: f64,
}

impl MarketQuote {
    /// Normalize raw fields and derive VWAP and deviation.
    pub fn from_raw(raw: RawQuote) -> Self {
        let change_percent = match raw.change_percent {
            Some(c) if c != 0.0 => c,
            _ if raw.pre_close > 0.0 => (raw.price - raw.pre_close) / raw.pre_close * 100.0,
            _ => 0.0,
        };
        let vwap = compute_vwap(raw.amount, raw.volume, raw.price);
        let deviation = compute_deviation(raw.price, vwap);

        Self {
            symbol: normalize_code(&raw.symbol),
            name: raw.name,
            price: raw.price,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            pre_close: raw.pre_close,
            volume: raw.volume,
            amount: raw.amount,
            turnover_rate: raw.turnover_rate,
            volume_ratio: raw.volume_ratio,
            change_percent,
            vwap,
            deviation,
        }
    }

    /// A quote needs a positive price and volume to be screened.
    pub fn is_usable(&self) -> bool {
        self.price > 0.0 && self.volume > 0.0
    }

    /// Traded amount that can be relied on; zero without volume.
    pub fn effective_amount(&self) -> f64 {
        if self.volume > 0.0 {
            self.amount
        } else {
            0.0
        }
    }

    /// Traded amount in units of 100 million yuan.
    pub fn amount_yi(&self) -> f64 {
        self.effective_amount() / 1e8
    }

    /// Where the price sits inside the day's range, 0.5 for a flat range.
    pub fn price_position(&self) -> f64 {
        if self.high > self.low {
            (self.price - self.low) / (self.high - self.low)
        } else {
            0.5
        }
    }

    /// Intraday amplitude (%) relative to the low.
    pub fn amplitude(&self) -> f64 {
        if self.low > 0.0 {
            (self.high - self.low) / self.low * 100.0
        } else {
            0.0
        }
    }

    pub fn is_special_treatment(&self) -> bool {
        is_special_treatment_name(&self.name)
    }
}

/// VWAP from amount (yuan) and volume (lots).
pub fn compute_vwap(amount: f64, volume: f64, price: f64) -> f64 {
    if volume > 0.0 {
        amount / (volume * SHARES_PER_LOT)
    } else {
        price
    }
}

/// Percent distance of price from VWAP.
pub fn compute_deviation(price: f64, vwap: f64) -> f64 {
    if vwap > 0.0 {
        (price - vwap) / vwap * 100.0
    } else {
        0.0
    }
}

// ============================================================================
// Symbol Helpers
// ============================================================================

/// Reduce "600000.SH", "sh600000" or "600000" to the bare code.
pub fn normalize_code(symbol: &str) -> String {
    let trimmed = symbol.trim();
    let base = trimmed.split('.').next().unwrap_or(trimmed);
    let lower = base.to_lowercase();
    let stripped = ["sh", "sz", "bj"]
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .unwrap_or(lower.as_str());
    stripped.to_string()
}

const SPECIAL_TREATMENT_PREFIXES: [&str; 4] = ["ST", "*ST", "SST", "S*ST"];

/// ST, *ST and delisting-arrangement names. The marker is a name prefix.
pub fn is_special_treatment_name(name: &str) -> bool {
    let name = name.trim_start();
    SPECIAL_TREATMENT_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
        || name.contains('退')
}

/// Beijing Stock Exchange codes.
pub fn is_beijing_code(code: &str) -> bool {
    let code = normalize_code(code);
    code.starts_with('8') || code.starts_with('4')
}

/// STAR market codes.
pub fn is_star_code(code: &str) -> bool {
    normalize_code(code).starts_with("688")
}
