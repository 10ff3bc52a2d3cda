//! Composite scoring.
//!
//! Six piecewise-linear sub-scores, each mapped into [0, 100], combined as a
//! weighted average with the profile's weights. Scoring is pure: the same
//! quote and profile always give the same candidate.

use serde::{Deserialize, Serialize};

use crate::data::MarketQuote;

use super::capitalization::CapEstimate;
use super::filter::FilteredQuote;
use super::profile::{CapTier, FilterProfile, ScoreWeights, TurnoverRule};

// ============================================================================
// Sub-scores
// ============================================================================

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

/// Smaller |deviation| from VWAP is better.
pub fn deviation_score(deviation: f64) -> f64 {
    let d = deviation.abs();
    if d <= 0.5 {
        100.0
    } else if d <= 1.0 {
        90.0
    } else if d <= 1.5 {
        80.0
    } else if d <= 2.0 {
        70.0
    } else if d <= 3.0 {
        50.0
    } else {
        20.0
    }
}

/// Moderate gains score best; above 6% is treated as a possible trap.
pub fn change_score(change: f64) -> f64 {
    let score = if change <= 0.0 {
        0.0
    } else if change < 0.8 {
        change / 0.8 * 40.0
    } else if change < 2.0 {
        40.0 + (change - 0.8) / 1.2 * 40.0
    } else if change < 4.0 {
        80.0 + (change - 2.0) / 2.0 * 15.0
    } else if change < 6.0 {
        95.0 + (change - 4.0) / 2.0 * 5.0
    } else {
        90.0
    };
    clamp_score(score)
}

pub fn turnover_score(turnover: f64) -> f64 {
    let score = if turnover < 1.0 {
        20.0
    } else if turnover < 3.0 {
        40.0 + (turnover - 1.0) / 2.0 * 40.0
    } else if turnover < 6.0 {
        80.0 + (turnover - 3.0) / 3.0 * 20.0
    } else {
        80.0
    };
    clamp_score(score)
}

/// `amount_yi` is the traded amount in units of 100 million yuan.
pub fn amount_score(amount_yi: f64) -> f64 {
    let score = if amount_yi < 1.0 {
        30.0
    } else if amount_yi < 3.0 {
        30.0 + (amount_yi - 1.0) / 2.0 * 40.0
    } else if amount_yi < 5.0 {
        70.0 + (amount_yi - 3.0) / 2.0 * 20.0
    } else if amount_yi < 10.0 {
        90.0 + (amount_yi - 5.0) / 5.0 * 10.0
    } else {
        100.0
    };
    clamp_score(score)
}

/// `position` is (price - low) / (high - low).
pub fn position_score(position: f64) -> f64 {
    let score = if position < 0.5 {
        position / 0.5 * 60.0
    } else if position < 0.8 {
        60.0 + (position - 0.5) / 0.3 * 30.0
    } else if position < 0.95 {
        90.0 + (position - 0.8) / 0.15 * 10.0
    } else {
        100.0
    };
    clamp_score(score)
}

/// 6-10% is the healthy band.
pub fn amplitude_score(amplitude: f64) -> f64 {
    if amplitude < 3.0 {
        40.0
    } else if amplitude < 6.0 {
        60.0
    } else if amplitude < 10.0 {
        80.0
    } else {
        60.0
    }
}

// ============================================================================
// Scored Candidate
// ============================================================================

/// The six sub-scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub deviation: f64,
    pub change: f64,
    pub turnover: f64,
    pub amount: f64,
    pub position: f64,
    pub amplitude: f64,
}

impl ScoreBreakdown {
    pub fn for_quote(quote: &MarketQuote) -> Self {
        Self {
            deviation: deviation_score(quote.deviation),
            change: change_score(quote.change_percent),
            turnover: turnover_score(quote.turnover_rate.unwrap_or(0.0)),
            amount: amount_score(quote.amount_yi()),
            position: position_score(quote.price_position()),
            amplitude: amplitude_score(quote.amplitude()),
        }
    }

    pub fn as_array(&self) -> [f64; 6] {
        [
            self.deviation,
            self.change,
            self.turnover,
            self.amount,
            self.position,
            self.amplitude,
        ]
    }

    /// Σ(score × weight) / 100.
    pub fn weighted_total(&self, weights: &ScoreWeights) -> f64 {
        self.as_array()
            .iter()
            .zip(weights.as_array())
            .map(|(score, weight)| score * weight)
            .sum::<f64>()
            / 100.0
    }
}

/// A quote that passed the filters, with its scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub quote: MarketQuote,
    /// Estimated free-float capitalization, yuan (not provider data)
    pub estimated_cap: Option<f64>,
    pub cap_tier: Option<CapTier>,
    /// Turnover band applied, for reports
    pub turnover_range: String,
    pub amount_yi: f64,
    pub price_position: f64,
    pub amplitude: f64,
    pub scores: ScoreBreakdown,
    pub total_score: f64,
}

impl ScoredCandidate {
    pub fn symbol(&self) -> &str {
        &self.quote.symbol
    }
}

// ============================================================================
// Scorer
// ============================================================================

/// Scores filtered quotes against one profile.
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: ScoreWeights,
    turnover: TurnoverRule,
    floor: f64,
}

impl Scorer {
    pub fn new(weights: ScoreWeights, turnover: TurnoverRule, floor: f64) -> Self {
        Self {
            weights,
            turnover,
            floor,
        }
    }

    pub fn for_profile(profile: &FilterProfile) -> Self {
        Self::new(profile.weights, profile.turnover, profile.score_floor)
    }

    /// Score one quote; never discards.
    pub fn score(&self, quote: &MarketQuote, cap: Option<CapEstimate>) -> ScoredCandidate {
        let scores = ScoreBreakdown::for_quote(quote);
        let tier = cap.map(|c| c.tier);

        ScoredCandidate {
            quote: quote.clone(),
            estimated_cap: cap.map(|c| c.value),
            cap_tier: tier,
            turnover_range: self.turnover.describe(tier),
            amount_yi: quote.amount_yi(),
            price_position: quote.price_position(),
            amplitude: quote.amplitude(),
            total_score: scores.weighted_total(&self.weights),
            scores,
        }
    }

    /// Score every filtered quote and drop those below the floor.
    ///
    /// Input order is preserved so ranking ties stay in fetch order.
    pub fn score_all(&self, filtered: &[FilteredQuote]) -> Vec<ScoredCandidate> {
        filtered
            .iter()
            .map(|f| self.score(&f.quote, f.cap))
            .filter(|c| c.total_score >= self.floor)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RawQuote;
    use test_case::test_case;

    fn create_test_quote() -> MarketQuote {
        MarketQuote::from_raw(RawQuote {
            symbol: "600000".into(),
            name: "测试股份".into(),
            price: 10.0,
            open: 9.8,
            high: 10.02,
            low: 9.7,
            pre_close: 9.75,
            volume: 505_050.0,
            amount: 500_000_000.0,
            turnover_rate: Some(6.0),
            volume_ratio: Some(1.5),
            change_percent: Some(2.56),
        })
    }

    #[test_case(0.3 => 100.0)]
    #[test_case(-0.8 => 90.0 ; "negative uses absolute value")]
    #[test_case(1.5 => 80.0)]
    #[test_case(2.0 => 70.0)]
    #[test_case(2.5 => 50.0)]
    #[test_case(4.0 => 20.0)]
    fn test_deviation_score(d: f64) -> f64 {
        deviation_score(d)
    }

    #[test_case(-1.0 => 0.0)]
    #[test_case(0.4 => 20.0)]
    #[test_case(2.0 => 80.0)]
    #[test_case(4.0 => 95.0)]
    #[test_case(6.5 => 90.0)]
    fn test_change_score(c: f64) -> f64 {
        change_score(c)
    }

    #[test_case(0.5 => 20.0)]
    #[test_case(2.0 => 60.0)]
    #[test_case(4.5 => 90.0)]
    #[test_case(12.0 => 80.0)]
    fn test_turnover_score(t: f64) -> f64 {
        turnover_score(t)
    }

    #[test_case(0.5 => 30.0)]
    #[test_case(2.0 => 50.0)]
    #[test_case(4.0 => 80.0)]
    #[test_case(7.5 => 95.0)]
    #[test_case(20.0 => 100.0)]
    fn test_amount_score(a: f64) -> f64 {
        amount_score(a)
    }

    #[test_case(0.25 => 30.0)]
    #[test_case(0.5 => 60.0)]
    #[test_case(0.95 => 100.0)]
    fn test_position_score(p: f64) -> f64 {
        position_score(p)
    }

    #[test_case(2.0 => 40.0)]
    #[test_case(4.0 => 60.0)]
    #[test_case(8.0 => 80.0)]
    #[test_case(15.0 => 60.0)]
    fn test_amplitude_score(a: f64) -> f64 {
        amplitude_score(a)
    }

    #[test]
    fn test_sub_scores_stay_in_range() {
        let mut x = -20.0;
        while x < 40.0 {
            for s in [
                deviation_score(x),
                change_score(x),
                turnover_score(x),
                amount_score(x),
                position_score(x / 20.0),
                amplitude_score(x),
            ] {
                assert!((0.0..=100.0).contains(&s), "score {} out of range at {}", s, x);
            }
            x += 0.05;
        }
    }

    #[test]
    fn test_total_is_weighted_average() {
        let profile = FilterProfile::burial_1450();
        let scorer = Scorer::for_profile(&profile);
        let candidate = scorer.score(&create_test_quote(), None);

        let s = candidate.scores;
        let expected = (s.deviation * 25.0
            + s.change * 15.0
            + s.turnover * 20.0
            + s.amount * 20.0
            + s.position * 15.0
            + s.amplitude * 5.0)
            / 100.0;
        assert!((candidate.total_score - expected).abs() < 1e-6);
        assert_eq!(s.turnover, 80.0);
        assert_eq!(s.deviation, 80.0);
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let profile = FilterProfile::burial_1450();
        let scorer = Scorer::for_profile(&profile);
        let quote = create_test_quote();
        assert_eq!(
            scorer.score(&quote, None),
            scorer.score(&quote, None)
        );
    }

    #[test]
    fn test_floor_discards() {
        let profile = FilterProfile::burial_1450();
        let filtered = vec![FilteredQuote {
            quote: create_test_quote(),
            cap: None,
        }];

        let lenient = Scorer::new(profile.weights, profile.turnover, 0.0);
        assert_eq!(lenient.score_all(&filtered).len(), 1);

        let strict = Scorer::new(profile.weights, profile.turnover, 99.9);
        assert!(strict.score_all(&filtered).is_empty());
    }

    #[test]
    fn test_turnover_range_follows_cap_tier() {
        let profile = FilterProfile::burial_1450();
        let scorer = Scorer::for_profile(&profile);
        let cap = CapEstimate::from_quote_fields(600_000_000.0, Some(4.0), &profile.cap_tiers);

        let candidate = scorer.score(&create_test_quote(), cap);
        assert_eq!(
            candidate.turnover_range,
            profile.turnover.describe(cap.map(|c| c.tier))
        );
        assert_eq!(candidate.cap_tier, cap.map(|c| c.tier));

        let flat = Scorer::new(profile.weights, TurnoverRule::flat(2.0, 10.0), 0.0);
        let candidate = flat.score(&create_test_quote(), cap);
        assert_eq!(candidate.turnover_range, "2.0%-10.0%");
    }
}
