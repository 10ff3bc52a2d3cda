//! Synthetic quote and universe generator.
//!
//! Produces plausible, deterministic intraday snapshots so the pipeline can
//! run without network access. The same seed and symbol always yield the same
//! quote.

use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::provider::{ProviderError, QuoteBatch, QuoteSource};
use super::universe::{UniverseEntry, UniverseSource};
use super::{MarketQuote, RawQuote};

/// FNV-1a, stable across runs and platforms.
fn symbol_hash(symbol: &str) -> u64 {
    symbol.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

// ============================================================================
// Synthetic Quotes
// ============================================================================

/// Deterministic quote generator implementing [`QuoteSource`].
pub struct SyntheticSource {
    seed: u64,
    index_change: f64,
}

impl SyntheticSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            index_change: 0.3,
        }
    }

    /// Fix the change % reported for any index code.
    pub fn with_index_change(mut self, change: f64) -> Self {
        self.index_change = change;
        self
    }

    /// Generate the snapshot for one symbol.
    pub fn quote_for(&self, symbol: &str) -> MarketQuote {
        let mut rng = StdRng::seed_from_u64(self.seed ^ symbol_hash(symbol));

        let pre_close: f64 = rng.gen_range(3.0..60.0);
        let change: f64 = rng.gen_range(-5.0..9.0);
        let price = round2(pre_close * (1.0 + change / 100.0));
        let open = round2(pre_close * (1.0 + rng.gen_range(-0.02_f64..0.03)));
        let high = round2(price.max(open) * (1.0 + rng.gen_range(0.0_f64..0.02)));
        let low = round2(price.min(open) * (1.0 - rng.gen_range(0.0_f64..0.03)));

        let volume = rng.gen_range(10_000.0_f64..800_000.0).round();
        let vwap = price * (1.0 - rng.gen_range(-0.02_f64..0.03));
        let amount = (vwap * volume * 100.0).round();

        let name = if rng.gen_ratio(1, 25) {
            format!("ST合成{}", symbol)
        } else {
            format!("合成{}", symbol)
        };

        MarketQuote::from_raw(RawQuote {
            symbol: symbol.to_string(),
            name,
            price,
            open,
            high,
            low,
            pre_close: round2(pre_close),
            volume,
            amount,
            turnover_rate: Some(rng.gen_range(0.5_f64..15.0)),
            volume_ratio: Some(rng.gen_range(0.5_f64..3.0)),
            change_percent: None,
        })
    }
}

#[async_trait]
impl QuoteSource for SyntheticSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn fetch_batch(&self, symbols: &[String]) -> Result<QuoteBatch, ProviderError> {
        Ok(QuoteBatch {
            quotes: symbols.iter().map(|s| self.quote_for(s)).collect(),
            dropped: 0,
        })
    }

    async fn fetch_index(&self, code: &str) -> Result<Option<MarketQuote>, ProviderError> {
        let pre_close = 3000.0;
        let price = pre_close * (1.0 + self.index_change / 100.0);
        Ok(Some(MarketQuote::from_raw(RawQuote {
            symbol: code.to_string(),
            name: "上证指数".to_string(),
            price,
            open: pre_close,
            high: price.max(pre_close),
            low: price.min(pre_close),
            pre_close,
            volume: 0.0,
            amount: 0.0,
            turnover_rate: None,
            volume_ratio: None,
            change_percent: Some(self.index_change),
        })))
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ============================================================================
// Synthetic Universe
// ============================================================================

/// Generated universe spread over the main boards, ChiNext, STAR and Beijing.
pub struct SyntheticUniverse {
    size: usize,
}

impl SyntheticUniverse {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

#[async_trait]
impl UniverseSource for SyntheticUniverse {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn load(&self) -> Result<Vec<UniverseEntry>> {
        const PREFIXES: [&str; 5] = ["600", "000", "300", "688", "830"];

        Ok((0..self.size)
            .map(|i| {
                let prefix = PREFIXES[i % PREFIXES.len()];
                let code = format!("{}{:03}", prefix, i / PREFIXES.len() % 1000);
                UniverseEntry::new(&code, None)
            })
            .collect())
    }
}
