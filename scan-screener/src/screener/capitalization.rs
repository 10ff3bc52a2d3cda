//! Capitalization estimate.
//!
//! None of the quote sources return free-float capitalization, so it is
//! back-derived from the session's traded amount and turnover rate:
//!
//! ```text
//! estimated_cap = amount / (turnover_rate / 100)
//! ```
//!
//! This assumes the turnover rate is measured against free float on the same
//! session as the amount. It is a first-order estimate and the largest source
//! of numerical error in the pipeline; results carry it as `estimated_cap`,
//! never as a provider field.

use serde::{Deserialize, Serialize};

use super::profile::{CapTier, CapTiers};

/// Estimated free-float capitalization in yuan.
///
/// `None` when either input is missing or not positive.
pub fn estimate_cap(amount: f64, turnover_rate: Option<f64>) -> Option<f64> {
    match turnover_rate {
        Some(t) if t > 0.0 && amount > 0.0 => Some(amount / (t / 100.0)),
        _ => None,
    }
}

/// An estimate together with its tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapEstimate {
    /// Yuan
    pub value: f64,
    pub tier: CapTier,
}

impl CapEstimate {
    pub fn from_quote_fields(
        amount: f64,
        turnover_rate: Option<f64>,
        tiers: &CapTiers,
    ) -> Option<Self> {
        estimate_cap(amount, turnover_rate).map(|value| Self {
            value,
            tier: tiers.tier_for(value),
        })
    }
}
