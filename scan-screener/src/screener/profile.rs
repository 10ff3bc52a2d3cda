//! Filter profiles.
//!
//! A profile is the full set of thresholds for one screening pass. The four
//! built-in profiles cover the intraday time slots; `profiles.json` may
//! override them field by field or add new ones.
//!
//! ```json
//! {
//!   "burial-1450": { "max_deviation": 4.0 },
//!   "wide-open":   { "description": "...", "min_change": -5.0 }
//! }
//! ```
//!
//! Entries are deep-merged over the built-in profile of the same name, or over
//! the default profile for new names, then validated.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

use scan_common::config_loader::{load_json_file, merge_json};
use scan_common::validation::{check_bounds, collect_errors, Validate, ValidationResult};
use scan_common::ValidationError;

/// Name of the profile used when none is requested.
pub const DEFAULT_PROFILE: &str = "burial-1450";

// ============================================================================
// Bands & Tiers
// ============================================================================

/// Inclusive numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%-{:.1}%", self.min, self.max)
    }
}

/// Capitalization bucket used to pick a turnover band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapTier {
    Small,
    Mid,
    Large,
}

impl fmt::Display for CapTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Small => write!(f, "小盘"),
            Self::Mid => write!(f, "中盘"),
            Self::Large => write!(f, "大盘"),
        }
    }
}

/// Tier thresholds in yuan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapTiers {
    /// Below this is small cap
    #[serde(default = "default_small_below")]
    pub small_below: f64,
    /// Below this (and at or above `small_below`) is mid cap
    #[serde(default = "default_mid_below")]
    pub mid_below: f64,
}

impl Default for CapTiers {
    fn default() -> Self {
        Self {
            small_below: default_small_below(),
            mid_below: default_mid_below(),
        }
    }
}

fn default_small_below() -> f64 {
    10e9
}

fn default_mid_below() -> f64 {
    30e9
}

impl CapTiers {
    pub fn tier_for(&self, cap: f64) -> CapTier {
        if cap < self.small_below {
            CapTier::Small
        } else if cap < self.mid_below {
            CapTier::Mid
        } else {
            CapTier::Large
        }
    }
}

// ============================================================================
// Turnover Rule
// ============================================================================

/// How the turnover rate is judged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnoverRule {
    /// One band per cap tier; needs an estimable capitalization.
    Tiered { small: Band, mid: Band, large: Band },
    /// Accept very low or very high turnover, never the middle.
    UShaped {
        low_max: f64,
        high_min: f64,
        reject_min: f64,
        reject_max: f64,
    },
}

impl TurnoverRule {
    /// Same band for every tier.
    pub const fn flat(min: f64, max: f64) -> Self {
        let band = Band::new(min, max);
        Self::Tiered {
            small: band,
            mid: band,
            large: band,
        }
    }

    pub fn band_for(&self, tier: CapTier) -> Option<Band> {
        match self {
            Self::Tiered { small, mid, large } => Some(match tier {
                CapTier::Small => *small,
                CapTier::Mid => *mid,
                CapTier::Large => *large,
            }),
            Self::UShaped { .. } => None,
        }
    }

    /// Judge a positive turnover rate. Tiered rules fail without a tier.
    pub fn accepts(&self, turnover: f64, tier: Option<CapTier>) -> bool {
        match self {
            Self::Tiered { .. } => tier
                .and_then(|t| self.band_for(t))
                .map_or(false, |band| band.contains(turnover)),
            Self::UShaped {
                low_max,
                high_min,
                reject_min,
                reject_max,
            } => {
                let in_wings = turnover < *low_max || turnover > *high_min;
                let rejected = turnover >= *reject_min && turnover <= *reject_max;
                in_wings && !rejected
            }
        }
    }

    /// Human-readable range for reports.
    pub fn describe(&self, tier: Option<CapTier>) -> String {
        match (self, tier) {
            (Self::UShaped { low_max, high_min, .. }, _) => {
                format!("<{:.1}% | >{:.1}%", low_max, high_min)
            }
            (rule, Some(t)) => rule
                .band_for(t)
                .map(|b| b.to_string())
                .unwrap_or_default(),
            (_, None) => String::new(),
        }
    }
}

// ============================================================================
// Score Weights
// ============================================================================

/// Sub-score weights; must sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub deviation: f64,
    pub change: f64,
    pub turnover: f64,
    pub amount: f64,
    pub position: f64,
    pub amplitude: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            deviation: 25.0,
            change: 15.0,
            turnover: 20.0,
            amount: 20.0,
            position: 15.0,
            amplitude: 5.0,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
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
}

// ============================================================================
// Filter Profile
// ============================================================================

/// Thresholds for one screening pass. Read-only once a pass starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterProfile {
    pub name: String,
    pub description: String,

    // === Price & Name ===
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub exclude_special_treatment: bool,
    pub exclude_star_market: bool,

    // === Capitalization (estimated, yuan) ===
    pub min_cap: Option<f64>,
    pub max_cap: Option<f64>,
    pub cap_tiers: CapTiers,

    // === Momentum ===
    pub min_change: Option<f64>,
    pub max_change: Option<f64>,
    /// `(min, max)` instead of `[min, max]`
    pub change_bounds_exclusive: bool,
    pub turnover: TurnoverRule,

    // === Liquidity & Shape ===
    pub min_amount: Option<f64>,
    pub max_deviation: Option<f64>,
    pub require_above_vwap: bool,
    pub require_above_open: bool,
    /// Price must be at least `high * ratio`
    pub near_high_ratio: Option<f64>,
    pub min_volume_ratio: Option<f64>,
    pub max_volume_ratio: Option<f64>,
    /// Estimated main-force inflow, yuan
    pub min_inflow: Option<f64>,
    pub min_inflow_ratio: Option<f64>,

    // === Market Gate ===
    /// Abort the pass when the reference index falls below this change (%)
    pub index_risk_threshold: Option<f64>,

    // === Scoring ===
    pub weights: ScoreWeights,
    pub score_floor: f64,
    pub top_n: usize,
}

impl Default for FilterProfile {
    fn default() -> Self {
        Self::burial_1450()
    }
}

impl FilterProfile {
    /// Tail-market "main-force burial" at 14:50.
    pub fn burial_1450() -> Self {
        Self {
            name: "burial-1450".to_string(),
            description: "尾盘主力埋伏 14:50".to_string(),
            min_price: None,
            max_price: None,
            exclude_special_treatment: true,
            exclude_star_market: false,
            min_cap: Some(2e9),
            max_cap: Some(20e9),
            cap_tiers: CapTiers::default(),
            min_change: Some(0.5),
            max_change: Some(8.0),
            change_bounds_exclusive: true,
            turnover: TurnoverRule::Tiered {
                small: Band::new(3.0, 12.0),
                mid: Band::new(2.0, 10.0),
                large: Band::new(1.5, 8.0),
            },
            min_amount: Some(1e7),
            max_deviation: Some(5.0),
            require_above_vwap: true,
            require_above_open: true,
            near_high_ratio: Some(0.995),
            min_volume_ratio: None,
            max_volume_ratio: None,
            min_inflow: None,
            min_inflow_ratio: None,
            index_risk_threshold: Some(-0.6),
            weights: ScoreWeights::default(),
            score_floor: 60.0,
            top_n: 10,
        }
    }

    /// 14:30 variant: flat turnover band and an inflow requirement.
    pub fn burial_1430() -> Self {
        Self {
            name: "burial-1430".to_string(),
            description: "尾盘主力埋伏 14:30".to_string(),
            min_change: Some(-2.0),
            max_change: Some(7.0),
            change_bounds_exclusive: false,
            turnover: TurnoverRule::flat(5.0, 10.0),
            require_above_vwap: false,
            require_above_open: false,
            near_high_ratio: None,
            min_volume_ratio: Some(1.2),
            min_inflow: Some(3e7),
            min_inflow_ratio: Some(0.15),
            ..Self::burial_1450()
        }
    }

    /// Late-morning pass.
    pub fn midday_1130() -> Self {
        Self {
            name: "midday-1130".to_string(),
            description: "午盘精选 11:30".to_string(),
            min_price: Some(3.0),
            max_price: Some(200.0),
            min_cap: Some(3e9),
            max_cap: Some(200e9),
            turnover: TurnoverRule::flat(0.8, 8.0),
            min_volume_ratio: Some(1.1),
            min_change: Some(-3.0),
            max_change: Some(8.0),
            min_inflow: Some(2e7),
            min_inflow_ratio: Some(0.12),
            ..Self::burial_1430()
        }
    }

    /// "Quick knife": narrow change window and U-shaped turnover.
    pub fn quick_knife() -> Self {
        Self {
            name: "quick-knife".to_string(),
            description: "快刀手晚进早出".to_string(),
            exclude_star_market: true,
            min_cap: None,
            max_cap: Some(20e9),
            min_change: Some(2.8),
            max_change: Some(4.5),
            change_bounds_exclusive: false,
            turnover: TurnoverRule::UShaped {
                low_max: 2.5,
                high_min: 18.0,
                reject_min: 5.0,
                reject_max: 10.0,
            },
            require_above_vwap: false,
            require_above_open: false,
            near_high_ratio: None,
            min_volume_ratio: Some(1.0),
            max_volume_ratio: Some(1.6),
            index_risk_threshold: None,
            ..Self::burial_1450()
        }
    }

    /// Whether a change (%) lies within the configured bounds.
    pub fn change_in_bounds(&self, change: f64) -> bool {
        let above = match self.min_change {
            Some(min) if self.change_bounds_exclusive => change > min,
            Some(min) => change >= min,
            None => true,
        };
        let below = match self.max_change {
            Some(max) if self.change_bounds_exclusive => change < max,
            Some(max) => change <= max,
            None => true,
        };
        above && below
    }

    /// Tier ordering concerns; logged, never enforced.
    pub fn monotonicity_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let TurnoverRule::Tiered { small, mid, large } = self.turnover {
            if small.max < mid.max || mid.max < large.max {
                warnings.push(format!(
                    "turnover upper bounds not decreasing with cap: small {}, mid {}, large {}",
                    small.max, mid.max, large.max
                ));
            }
            if small.min < mid.min || mid.min < large.min {
                warnings.push(format!(
                    "turnover lower bounds not decreasing with cap: small {}, mid {}, large {}",
                    small.min, mid.min, large.min
                ));
            }
        }
        warnings
    }

    /// Parameters in the flat shape stored with each result.
    pub fn params_summary(&self) -> String {
        let bound = |v: Option<f64>| v.map_or("-".to_string(), |x| format!("{}", x));
        format!(
            "change {}..{}, cap {}..{}, max deviation {}, min amount {}",
            bound(self.min_change),
            bound(self.max_change),
            bound(self.min_cap),
            bound(self.max_cap),
            bound(self.max_deviation),
            bound(self.min_amount)
        )
    }
}

impl Validate for FilterProfile {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        let field = |f: &str| format!("profiles.{}.{}", self.name, f);

        if self.name.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "profiles.name".into(),
            });
        }

        check_bounds(&mut errors, &field("price"), self.min_price, self.max_price);
        check_bounds(&mut errors, &field("cap"), self.min_cap, self.max_cap);
        check_bounds(&mut errors, &field("change"), self.min_change, self.max_change);
        check_bounds(
            &mut errors,
            &field("volume_ratio"),
            self.min_volume_ratio,
            self.max_volume_ratio,
        );

        if self.cap_tiers.small_below > self.cap_tiers.mid_below {
            errors.push(ValidationError::invalid(
                field("cap_tiers"),
                "small_below must not exceed mid_below",
            ));
        }

        match self.turnover {
            TurnoverRule::Tiered { small, mid, large } => {
                for (tier, band) in [("small", small), ("mid", mid), ("large", large)] {
                    if band.min < 0.0 {
                        errors.push(ValidationError::invalid(
                            field(&format!("turnover.{}", tier)),
                            "band must be non-negative",
                        ));
                    }
                    check_bounds(
                        &mut errors,
                        &field(&format!("turnover.{}", tier)),
                        Some(band.min),
                        Some(band.max),
                    );
                }
            }
            TurnoverRule::UShaped {
                low_max,
                high_min,
                reject_min,
                reject_max,
            } => {
                if low_max < 0.0 || reject_min < 0.0 {
                    errors.push(ValidationError::invalid(
                        field("turnover"),
                        "thresholds must be non-negative",
                    ));
                }
                check_bounds(&mut errors, &field("turnover.wings"), Some(low_max), Some(high_min));
                check_bounds(
                    &mut errors,
                    &field("turnover.reject"),
                    Some(reject_min),
                    Some(reject_max),
                );
            }
        }

        if let Some(ratio) = self.near_high_ratio {
            if ratio <= 0.0 || ratio > 1.0 {
                errors.push(ValidationError::invalid(
                    field("near_high_ratio"),
                    "must be in (0, 1]",
                ));
            }
        }

        if let Some(dev) = self.max_deviation {
            if dev < 0.0 {
                errors.push(ValidationError::invalid(
                    field("max_deviation"),
                    "must be non-negative",
                ));
            }
        }

        if self.weights.as_array().iter().any(|w| *w < 0.0) {
            errors.push(ValidationError::invalid(
                field("weights"),
                "weights must be non-negative",
            ));
        }
        if (self.weights.sum() - 100.0).abs() > 1e-6 {
            errors.push(ValidationError::invalid(
                field("weights"),
                format!("weights sum to {}, expected 100", self.weights.sum()),
            ));
        }

        if !(0.0..=100.0).contains(&self.score_floor) {
            errors.push(ValidationError::invalid(
                field("score_floor"),
                "must be in [0, 100]",
            ));
        }

        if self.top_n == 0 {
            errors.push(ValidationError::invalid(field("top_n"), "must be at least 1"));
        }

        collect_errors(errors)
    }
}

// ============================================================================
// Profile Registry
// ============================================================================

/// Named profiles available to the engine.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, FilterProfile>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProfileRegistry {
    /// The four built-in profiles.
    pub fn builtin() -> Self {
        let profiles = [
            FilterProfile::burial_1450(),
            FilterProfile::burial_1430(),
            FilterProfile::midday_1130(),
            FilterProfile::quick_knife(),
        ]
        .into_iter()
        .map(|p| (p.name.clone(), p))
        .collect();

        Self { profiles }
    }

    /// Built-ins plus overrides from a profiles file, if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut registry = Self::builtin();

        let Some(path) = path else {
            return Ok(registry);
        };
        let Some(value) = load_json_file(path)? else {
            debug!(path = %path.display(), "No profiles file, using built-ins");
            return Ok(registry);
        };

        registry
            .apply_overrides(value)
            .with_context(|| format!("Invalid profiles in {}", path.display()))?;

        Ok(registry)
    }

    /// Merge a `{name: partial profile}` object over the registry.
    pub fn apply_overrides(&mut self, value: Value) -> Result<()> {
        let Value::Object(entries) = value else {
            anyhow::bail!("profiles file must be a JSON object keyed by profile name");
        };

        for (name, overrides) in entries {
            if name.starts_with('$') || name.starts_with('_') {
                continue;
            }

            let base = self
                .profiles
                .get(&name)
                .cloned()
                .unwrap_or_default();
            let mut merged = serde_json::to_value(&base)?;
            merge_json(&mut merged, overrides);

            let mut profile: FilterProfile = serde_json::from_value(merged)
                .with_context(|| format!("Failed to parse profile '{}'", name))?;
            profile.name = name.clone();

            profile
                .validate()
                .map_err(|e| anyhow::anyhow!("{}", e))?;

            for warning in profile.monotonicity_warnings() {
                warn!(profile = %name, "{}", warning);
            }

            debug!(profile = %name, "Loaded profile");
            self.profiles.insert(name, profile);
        }

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FilterProfile> {
        self.profiles.get(name)
    }

    /// Look up a profile, listing the known names on failure.
    pub fn resolve(&self, name: &str) -> scan_common::Result<&FilterProfile> {
        self.get(name).ok_or_else(|| {
            scan_common::Error::InvalidInput(format!(
                "Unknown profile '{}'. Available: {}",
                name,
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterProfile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
