//! Scan Common - Shared configuration, validation, errors and logging.
//!
//! This crate provides:
//! - Configuration types and layered loading (`config.json`, `secrets.json`, `.env`, env vars)
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    Config, EmailSinkConfig, FileSinkConfig, ObservabilityConfig, ProviderConfig, ProviderKind,
    ScheduleSlotConfig, SchedulerConfig, ScreeningConfig, SinksConfig, UniverseConfig,
    UniverseKind, WebhookSinkConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
