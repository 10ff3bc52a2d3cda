//! Configuration management for the scan services.
//!
//! Configuration lives in `~/.stockscan/` (override with `SCAN_CONFIG_DIR`).
//!
//! # Configuration Priority
//!
//! 1. Default values
//! 2. `config.json`, then `secrets.json` (deep-merged)
//! 3. `.env` in the working directory (loaded into the process environment)
//! 4. Environment variables
//!
//! # Environment Variable Mapping
//!
//! - `SCAN_LOG_LEVEL` → observability.log_level
//! - `SCAN_LOG_FORMAT` → observability.log_format
//! - `SCAN_PROVIDER` → provider.kind
//! - `GUGU_APPKEY` → provider.appkey
//! - `TUSHARE_TOKEN` → universe.tushare_token
//! - `SCAN_RESULTS_DIR` → screening.results_dir
//! - `WEBHOOK_URL` → sinks.webhook.url (also enables the webhook sink)
//! - `SMTP_SERVER`, `SMTP_PORT`, `SENDER_EMAIL`, `SENDER_PASSWORD`,
//!   `RECIPIENTS` (comma separated) → sinks.email.*

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config_loader::load_layered_config;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SCAN_CONFIG_DIR") {
        return expand_path(&dir);
    }

    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".stockscan"),
        |dirs| dirs.home_dir().join(".stockscan"),
    )
}

/// Expand a leading `~` in a configured path.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Load `.env` from the working directory into the process environment.
///
/// A missing file is not an error.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Failed to load .env"),
    }
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the scan services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Market data provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Stock universe configuration
    #[serde(default)]
    pub universe: UniverseConfig,

    /// Screening pass configuration
    #[serde(default)]
    pub screening: ScreeningConfig,

    /// Output sink configuration
    #[serde(default)]
    pub sinks: SinksConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Load configuration from the default directory, `.env` and environment.
    pub fn load() -> Result<Self> {
        load_dotenv();
        let mut config = Self::load_from_dir(&config_dir())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration files from a specific directory (no env overrides).
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let merged = load_layered_config(dir)?;

        let is_empty = merged.as_object().map_or(true, |m| m.is_empty());
        if is_empty {
            tracing::info!(dir = %dir.display(), "Config files not found, using defaults");
            return Ok(Self::default());
        }

        serde_json::from_value(merged)
            .with_context(|| format!("Failed to parse config from {}", dir.display()))
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("SCAN_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("SCAN_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        if let Some(kind) = lookup("SCAN_PROVIDER") {
            match kind.parse() {
                Ok(kind) => self.provider.kind = kind,
                Err(e) => tracing::warn!(error = %e, "Ignoring SCAN_PROVIDER"),
            }
        }
        if let Some(key) = lookup("GUGU_APPKEY") {
            self.provider.appkey = Some(key);
        }
        if let Some(token) = lookup("TUSHARE_TOKEN") {
            self.universe.tushare_token = Some(token);
        }

        if let Some(dir) = lookup("SCAN_RESULTS_DIR") {
            self.screening.results_dir = dir;
        }

        if let Some(url) = lookup("WEBHOOK_URL") {
            self.sinks.webhook.url = Some(url);
            self.sinks.webhook.enabled = true;
        }

        let email = &mut self.sinks.email;
        if let Some(server) = lookup("SMTP_SERVER") {
            email.smtp_server = Some(server);
        }
        if let Some(port) = lookup("SMTP_PORT") {
            if let Ok(p) = port.parse() {
                email.smtp_port = p;
            }
        }
        if let Some(sender) = lookup("SENDER_EMAIL") {
            email.sender = Some(sender);
        }
        if let Some(password) = lookup("SENDER_PASSWORD") {
            email.password = Some(password);
        }
        if let Some(recipients) = lookup("RECIPIENTS") {
            email.recipients = recipients
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect();
        }
    }

    /// Write this configuration as `config.json` into `dir`.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }

        let path = dir.join("config.json");
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(path)
    }

    /// Directory holding result files and the execution log.
    pub fn results_dir(&self) -> PathBuf {
        expand_path(&self.screening.results_dir)
    }

    /// Path of the user profile overrides file.
    pub fn profiles_path(&self) -> PathBuf {
        self.screening
            .profiles_file
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| config_dir().join("profiles.json"))
    }

    /// Path of the scheduler status file.
    pub fn scheduler_status_path(&self) -> PathBuf {
        self.scheduler
            .status_file
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| config_dir().join("scheduler_status.json"))
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Which quote source backs the fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Gugudata realtime HTTP API
    #[default]
    Gugudata,
    /// Deterministic generated quotes (offline runs, tests)
    Synthetic,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gugudata => write!(f, "gugudata"),
            Self::Synthetic => write!(f, "synthetic"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gugudata" | "gugu" => Ok(Self::Gugudata),
            "synthetic" | "mock" => Ok(Self::Synthetic),
            _ => Err(format!("Unknown provider kind: {}", s)),
        }
    }
}

/// Market data provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider implementation
    #[serde(default)]
    pub kind: ProviderKind,

    /// API base URL
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// API key (prefer `GUGU_APPKEY` or secrets.json)
    #[serde(default)]
    pub appkey: Option<String>,

    /// Symbols per request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Per-request timeout for quote batches
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Per-request timeout for the index reading
    #[serde(default = "default_index_timeout_secs")]
    pub index_timeout_secs: u64,

    /// Retries per batch after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff; attempt n waits n times this
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Pause between batches
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,

    /// Reference index codes, tried in order
    #[serde(default = "default_index_codes")]
    pub index_codes: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: default_provider_base_url(),
            appkey: None,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            index_timeout_secs: default_index_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            batch_pause_ms: default_batch_pause_ms(),
            index_codes: default_index_codes(),
        }
    }
}

// ============================================================================
// Universe
// ============================================================================

/// Where the list of symbols to scan comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UniverseKind {
    /// Symbols listed in `universe.symbols`
    #[default]
    Static,
    /// Listed A-shares from Tushare `stock_basic`
    Tushare,
    /// Generated symbol list
    Synthetic,
}

impl std::fmt::Display for UniverseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Tushare => write!(f, "tushare"),
            Self::Synthetic => write!(f, "synthetic"),
        }
    }
}

impl std::str::FromStr for UniverseKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "static" | "list" => Ok(Self::Static),
            "tushare" => Ok(Self::Tushare),
            "synthetic" | "mock" => Ok(Self::Synthetic),
            _ => Err(format!("Unknown universe kind: {}", s)),
        }
    }
}

/// Stock universe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseConfig {
    /// Universe source
    #[serde(default)]
    pub kind: UniverseKind,

    /// Six-digit codes for the static universe
    #[serde(default)]
    pub symbols: Vec<String>,

    /// Tushare Pro token (prefer `TUSHARE_TOKEN`)
    #[serde(default)]
    pub tushare_token: Option<String>,

    /// Tushare Pro endpoint
    #[serde(default = "default_tushare_url")]
    pub tushare_url: String,

    /// Drop Beijing exchange codes (8xxxxx / 4xxxxx)
    #[serde(default = "default_true")]
    pub exclude_beijing: bool,

    /// Number of symbols in the synthetic universe
    #[serde(default = "default_synthetic_size")]
    pub synthetic_size: usize,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            kind: UniverseKind::default(),
            symbols: Vec::new(),
            tushare_token: None,
            tushare_url: default_tushare_url(),
            exclude_beijing: true,
            synthetic_size: default_synthetic_size(),
        }
    }
}

// ============================================================================
// Screening
// ============================================================================

/// Screening pass configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningConfig {
    /// Profile used when none is given on the command line
    #[serde(default = "default_profile")]
    pub default_profile: String,

    /// Output directory for result files and the execution log
    #[serde(default = "default_results_dir")]
    pub results_dir: String,

    /// Extra profile definitions (defaults to `<config dir>/profiles.json`)
    #[serde(default)]
    pub profiles_file: Option<String>,

    /// Overall deadline for one pass
    #[serde(default = "default_pass_timeout_secs")]
    pub pass_timeout_secs: u64,

    /// Share of traded amount attributed to main-force inflow
    #[serde(default = "default_inflow_fraction")]
    pub inflow_fraction: f64,

    /// Version tag written into result files
    #[serde(default = "default_strategy_version")]
    pub strategy_version: String,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            default_profile: default_profile(),
            results_dir: default_results_dir(),
            profiles_file: None,
            pass_timeout_secs: default_pass_timeout_secs(),
            inflow_fraction: default_inflow_fraction(),
            strategy_version: default_strategy_version(),
        }
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Output sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinksConfig {
    /// Print the ranked table to stdout
    #[serde(default = "default_true")]
    pub console: bool,

    #[serde(default)]
    pub file: FileSinkConfig,

    #[serde(default)]
    pub webhook: WebhookSinkConfig,

    #[serde(default)]
    pub email: EmailSinkConfig,
}

impl Default for SinksConfig {
    fn default() -> Self {
        Self {
            console: true,
            file: FileSinkConfig::default(),
            webhook: WebhookSinkConfig::default(),
            email: EmailSinkConfig::default(),
        }
    }
}

/// Human-readable mirror written next to the JSON result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSinkConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// markdown or text
    #[serde(default = "default_file_format")]
    pub format: String,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: default_file_format(),
        }
    }
}

/// Chat webhook (WeChat Work robot compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSinkConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WebhookSinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

/// Email report settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSinkConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub smtp_server: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub sender: Option<String>,

    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    #[serde(default)]
    pub recipients: Vec<String>,
}

impl Default for EmailSinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: None,
            smtp_port: default_smtp_port(),
            sender: None,
            password: None,
            recipients: Vec::new(),
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// One scheduled screening run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSlotConfig {
    /// Slot name used in logs and the status file
    pub name: String,
    /// Cron expression with seconds (e.g. "0 50 14 * * Mon-Fri")
    pub cron: String,
    /// Profile to run
    pub profile: String,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_slots")]
    pub slots: Vec<ScheduleSlotConfig>,

    /// How long after the slot time a run may still start
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Kill the child pass after this long
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    /// Status file (defaults to `<config dir>/scheduler_status.json`)
    #[serde(default)]
    pub status_file: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            slots: default_slots(),
            window_minutes: default_window_minutes(),
            poll_interval_secs: default_poll_interval_secs(),
            run_timeout_secs: default_run_timeout_secs(),
            status_file: None,
        }
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
fn default_true() -> bool {
    true
}
fn default_provider_base_url() -> String {
    "https://api.gugudata.com".into()
}
fn default_batch_size() -> usize {
    40
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_index_timeout_secs() -> u64 {
    8
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    1000 // 1s, 2s, 3s
}
fn default_batch_pause_ms() -> u64 {
    100
}
fn default_index_codes() -> Vec<String> {
    vec!["000001".into(), "999999".into()]
}
fn default_tushare_url() -> String {
    "http://api.tushare.pro".into()
}
fn default_synthetic_size() -> usize {
    200
}
fn default_profile() -> String {
    "burial-1450".into()
}
fn default_results_dir() -> String {
    "~/.stockscan/results".into()
}
fn default_pass_timeout_secs() -> u64 {
    300 // matches the scheduler's child timeout
}
fn default_inflow_fraction() -> f64 {
    0.3
}
fn default_strategy_version() -> String {
    "2.0".into()
}
fn default_file_format() -> String {
    "markdown".into()
}
fn default_webhook_timeout_secs() -> u64 {
    10
}
fn default_smtp_port() -> u16 {
    465
}
fn default_slots() -> Vec<ScheduleSlotConfig> {
    vec![
        ScheduleSlotConfig {
            name: "midday".into(),
            cron: "0 30 11 * * Mon-Fri".into(),
            profile: "midday-1130".into(),
        },
        ScheduleSlotConfig {
            name: "afternoon".into(),
            cron: "0 30 14 * * Mon-Fri".into(),
            profile: "burial-1430".into(),
        },
        ScheduleSlotConfig {
            name: "tail".into(),
            cron: "0 50 14 * * Mon-Fri".into(),
            profile: "burial-1450".into(),
        },
    ]
}
fn default_window_minutes() -> u32 {
    1
}
fn default_poll_interval_secs() -> u64 {
    30
}
fn default_run_timeout_secs() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.provider.batch_size, 40);
        assert_eq!(config.provider.timeout_secs, 10);
        assert_eq!(config.provider.max_retries, 3);
        assert_eq!(config.provider.kind, ProviderKind::Gugudata);
        assert!(config.provider.appkey.is_none());
        assert_eq!(config.screening.pass_timeout_secs, 300);
        assert!((config.screening.inflow_fraction - 0.3).abs() < 1e-9);
        assert_eq!(config.scheduler.slots.len(), 3);
        assert!(config.sinks.console);
        assert!(!config.sinks.webhook.enabled);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"provider": {"batch_size": 30}}"#).unwrap();
        assert_eq!(config.provider.batch_size, 30);
        assert_eq!(config.provider.timeout_secs, 10);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup_from(&[
            ("GUGU_APPKEY", "abc"),
            ("TUSHARE_TOKEN", "tok"),
            ("SCAN_PROVIDER", "synthetic"),
            ("WEBHOOK_URL", "https://example.com/hook"),
            ("SMTP_PORT", "587"),
            ("RECIPIENTS", "a@x.com, b@x.com,"),
            ("SCAN_LOG_LEVEL", "debug"),
        ]));

        assert_eq!(config.provider.appkey.as_deref(), Some("abc"));
        assert_eq!(config.universe.tushare_token.as_deref(), Some("tok"));
        assert_eq!(config.provider.kind, ProviderKind::Synthetic);
        assert!(config.sinks.webhook.enabled);
        assert_eq!(config.sinks.email.smtp_port, 587);
        assert_eq!(config.sinks.email.recipients, vec!["a@x.com", "b@x.com"]);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_bad_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup_from(&[
            ("SCAN_PROVIDER", "bloomberg"),
            ("SMTP_PORT", "not-a-port"),
        ]));
        assert_eq!(config.provider.kind, ProviderKind::Gugudata);
        assert_eq!(config.sinks.email.smtp_port, 465);
    }

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!("Gugudata".parse::<ProviderKind>().unwrap(), ProviderKind::Gugudata);
        assert_eq!("mock".parse::<ProviderKind>().unwrap(), ProviderKind::Synthetic);
        assert!("other".parse::<ProviderKind>().is_err());
        assert_eq!("tushare".parse::<UniverseKind>().unwrap(), UniverseKind::Tushare);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.provider.batch_size = 25;
        config.sinks.email.password = Some("hidden".into());

        let path = config.save_to(dir.path()).unwrap();
        let written = fs::read_to_string(path).unwrap();
        assert!(!written.contains("hidden"));

        let loaded = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(loaded.provider.batch_size, 25);
        assert!(loaded.sinks.email.password.is_none());
    }

    #[test]
    fn test_load_from_empty_dir_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.screening.default_profile, "burial-1450");
    }

    #[test]
    fn test_expand_path_plain() {
        assert_eq!(expand_path("/tmp/results"), PathBuf::from("/tmp/results"));
    }
}
