//! Configuration validation.
//!
//! Provides validation logic for configuration fields to ensure
//! all required values are present and within valid ranges.

use thiserror::Error;

use crate::config::{
    Config, ObservabilityConfig, ProviderConfig, ProviderKind, SchedulerConfig, ScreeningConfig,
    UniverseConfig, UniverseKind,
};

/// Configuration validation error.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Shorthand for [`ValidationError::InvalidValue`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Flatten into the list of individual errors.
    pub fn into_vec(self) -> Vec<ValidationError> {
        match self {
            Self::Multiple(errors) => errors.into_iter().flat_map(Self::into_vec).collect(),
            other => vec![other],
        }
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

/// Fold collected errors into a single result.
pub fn collect_errors(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    if errors.is_empty() {
        Ok(())
    } else if errors.len() == 1 {
        Err(errors.remove(0))
    } else {
        Err(ValidationError::Multiple(errors))
    }
}

/// Check that an optional pair of bounds is ordered.
pub fn check_bounds(
    errors: &mut Vec<ValidationError>,
    field: &str,
    min: Option<f64>,
    max: Option<f64>,
) {
    if let (Some(lo), Some(hi)) = (min, max) {
        if lo > hi {
            errors.push(ValidationError::invalid(
                field,
                format!("min {} is greater than max {}", lo, hi),
            ));
        }
    }
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        for result in [
            self.observability.validate(),
            self.provider.validate(),
            self.universe.validate(),
            self.screening.validate(),
            self.scheduler.validate(),
        ] {
            if let Err(e) = result {
                errors.extend(e.into_vec());
            }
        }

        if self.provider.kind == ProviderKind::Synthetic
            && self.universe.kind == UniverseKind::Tushare
        {
            errors.push(ValidationError::Conflict {
                reason: "synthetic quotes cannot be requested for a Tushare universe".into(),
            });
        }

        collect_errors(errors)
    }

    /// Load and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load()?;
        config
            .validate()
            .map_err(|e| crate::Error::Config(e.to_string()))?;
        Ok(config)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if !["trace", "debug", "info", "warn", "error"].contains(&self.log_level.as_str()) {
            errors.push(ValidationError::invalid(
                "observability.log_level",
                format!("unknown level '{}'", self.log_level),
            ));
        }
        if !["json", "pretty"].contains(&self.log_format.as_str()) {
            errors.push(ValidationError::invalid(
                "observability.log_format",
                "must be 'json' or 'pretty'",
            ));
        }

        collect_errors(errors)
    }
}

impl Validate for ProviderConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.kind == ProviderKind::Gugudata
            && self.appkey.as_deref().map_or(true, str::is_empty)
        {
            errors.push(ValidationError::MissingField {
                field: "provider.appkey".into(),
            });
        }
        if self.batch_size == 0 {
            errors.push(ValidationError::invalid("provider.batch_size", "must be greater than 0"));
        }
        if self.timeout_secs == 0 {
            errors.push(ValidationError::invalid("provider.timeout_secs", "must be greater than 0"));
        }

        collect_errors(errors)
    }
}

impl Validate for UniverseConfig {
    fn validate(&self) -> ValidationResult<()> {
        match self.kind {
            UniverseKind::Static if self.symbols.is_empty() => Err(ValidationError::invalid(
                "universe.symbols",
                "must not be empty for a static universe",
            )),
            UniverseKind::Tushare if self.tushare_token.as_deref().map_or(true, str::is_empty) => {
                Err(ValidationError::MissingField {
                    field: "universe.tushare_token".into(),
                })
            }
            UniverseKind::Synthetic if self.synthetic_size == 0 => Err(ValidationError::invalid(
                "universe.synthetic_size",
                "must be greater than 0",
            )),
            _ => Ok(()),
        }
    }
}

impl Validate for ScreeningConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.pass_timeout_secs == 0 {
            errors.push(ValidationError::invalid(
                "screening.pass_timeout_secs",
                "must be greater than 0",
            ));
        }
        if !(self.inflow_fraction > 0.0 && self.inflow_fraction <= 1.0) {
            errors.push(ValidationError::invalid(
                "screening.inflow_fraction",
                "must be in (0, 1]",
            ));
        }
        if self.default_profile.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "screening.default_profile".into(),
            });
        }

        collect_errors(errors)
    }
}

impl Validate for SchedulerConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.window_minutes == 0 {
            errors.push(ValidationError::invalid(
                "scheduler.window_minutes",
                "must be greater than 0",
            ));
        }
        if self.run_timeout_secs == 0 {
            errors.push(ValidationError::invalid(
                "scheduler.run_timeout_secs",
                "must be greater than 0",
            ));
        }

        let mut names: Vec<&str> = self.slots.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            errors.push(ValidationError::Conflict {
                reason: "scheduler slot names must be unique".into(),
            });
        }

        collect_errors(errors)
    }
}
