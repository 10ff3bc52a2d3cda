//! Quote source abstraction.
//!
//! Every market data backend implements [`QuoteSource`] so the fetcher can
//! batch, retry and count calls without knowing the wire format.

use async_trait::async_trait;
use std::fmt;

use super::MarketQuote;

// ============================================================================
// Provider Error
// ============================================================================

/// Errors from a quote source.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    Network(String),
    /// Authentication error (invalid appkey)
    Auth(String),
    /// Non-success HTTP status
    Http { status: u16, body: String },
    /// Provider answered with a failure status code in the payload
    Status { code: i64, message: String },
    /// Response body could not be parsed
    Parse(String),
    /// Invalid request parameters
    InvalidRequest(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Auth(msg) => write!(f, "Authentication error: {}", msg),
            Self::Http { status, body } => write!(f, "HTTP {}: {}", status, body),
            Self::Status { code, message } => {
                write!(f, "Provider status {}: {}", code, message)
            }
            Self::Parse(msg) => write!(f, "Failed to parse response: {}", msg),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Check if the error is worth retrying.
    ///
    /// Auth and request errors will fail the same way again.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Auth(_) | Self::InvalidRequest(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Network("Request timeout".into())
        } else if e.is_connect() {
            Self::Network("Connection failed".into())
        } else if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

// ============================================================================
// Quote Source Trait
// ============================================================================

/// Quotes parsed from one batch response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteBatch {
    /// Usable, normalized quotes
    pub quotes: Vec<MarketQuote>,
    /// Records skipped because they were malformed or unusable
    pub dropped: usize,
}

/// Trait for realtime quote providers.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Provider name for logs (e.g., "gugudata")
    fn name(&self) -> &'static str;

    /// Fetch one batch of symbols in a single request.
    async fn fetch_batch(&self, symbols: &[String]) -> Result<QuoteBatch, ProviderError>;

    /// Fetch a reference index snapshot, `None` when the source has none.
    async fn fetch_index(&self, code: &str) -> Result<Option<MarketQuote>, ProviderError>;
}
