//! Batching quote fetcher.
//!
//! Splits the universe into provider-sized batches, retries failed batches
//! with linear backoff and keeps running call counters. A batch that still
//! fails after its retries contributes no quotes; the pass carries on with
//! whatever the other batches returned.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use scan_common::config::ProviderConfig;

use super::provider::{ProviderError, QuoteBatch, QuoteSource};
use super::MarketQuote;

// ============================================================================
// Options & Statistics
// ============================================================================

/// Batching and retry settings.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Symbols per request
    pub batch_size: usize,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Attempt n sleeps `retry_backoff * n` before retrying
    pub retry_backoff: Duration,
    /// Pause between consecutive batches
    pub batch_pause: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_config(&ProviderConfig::default())
    }
}

impl FetchOptions {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            batch_pause: Duration::from_millis(config.batch_pause_ms),
        }
    }

    /// No sleeping at all; used by tests and the synthetic provider.
    pub fn immediate(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            max_retries: 3,
            retry_backoff: Duration::ZERO,
            batch_pause: Duration::ZERO,
        }
    }
}

/// Snapshot of fetch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStats {
    /// Batches attempted
    pub total_calls: u64,
    /// Batches that returned data
    pub successful_calls: u64,
    /// Batches abandoned after retries
    pub failed_calls: u64,
    /// Retry attempts across all batches
    pub retries: u64,
    /// Usable quotes returned
    pub quotes_returned: u64,
    /// Records skipped as malformed or unusable
    pub records_dropped: u64,
}

impl FetchStats {
    /// Success rate (%) over attempted batches.
    pub fn success_rate(&self) -> f64 {
        if self.total_calls > 0 {
            self.successful_calls as f64 / self.total_calls as f64 * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    retries: AtomicU64,
    quotes_returned: AtomicU64,
    records_dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> FetchStats {
        FetchStats {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            quotes_returned: self.quotes_returned.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.total_calls,
            &self.successful_calls,
            &self.failed_calls,
            &self.retries,
            &self.quotes_returned,
            &self.records_dropped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// Batching fetcher over any [`QuoteSource`].
pub struct Fetcher<S: QuoteSource + ?Sized> {
    source: Arc<S>,
    options: FetchOptions,
    counters: Counters,
}

impl<S: QuoteSource + ?Sized> Fetcher<S> {
    pub fn new(source: Arc<S>, options: FetchOptions) -> Self {
        Self {
            source,
            options,
            counters: Counters::default(),
        }
    }

    /// Name of the underlying source.
    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Current counters.
    pub fn stats(&self) -> FetchStats {
        self.counters.snapshot()
    }

    /// Zero all counters.
    pub fn reset_stats(&self) {
        self.counters.reset();
    }

    /// Fetch quotes for every symbol, batch by batch.
    ///
    /// The result may be shorter than the input: failed batches and dropped
    /// records are only reflected in [`Fetcher::stats`].
    pub async fn fetch_all(&self, symbols: &[String]) -> Vec<MarketQuote> {
        let batch_count = symbols.len().div_ceil(self.options.batch_size);
        info!(
            source = self.source.name(),
            symbols = symbols.len(),
            batches = batch_count,
            "Fetching quotes"
        );

        let mut quotes = Vec::with_capacity(symbols.len());

        for (index, chunk) in symbols.chunks(self.options.batch_size).enumerate() {
            if index > 0 && !self.options.batch_pause.is_zero() {
                tokio::time::sleep(self.options.batch_pause).await;
            }

            self.counters.total_calls.fetch_add(1, Ordering::Relaxed);

            match self.fetch_with_retry(chunk).await {
                Ok(batch) => {
                    self.counters.successful_calls.fetch_add(1, Ordering::Relaxed);
                    self.counters
                        .quotes_returned
                        .fetch_add(batch.quotes.len() as u64, Ordering::Relaxed);
                    self.counters
                        .records_dropped
                        .fetch_add(batch.dropped as u64, Ordering::Relaxed);
                    debug!(
                        batch = index,
                        quotes = batch.quotes.len(),
                        dropped = batch.dropped,
                        "Batch fetched"
                    );
                    quotes.extend(batch.quotes);
                }
                Err(e) => {
                    self.counters.failed_calls.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        batch = index,
                        symbols = chunk.len(),
                        error = %e,
                        "Batch failed after retries, skipping"
                    );
                }
            }
        }

        let stats = self.stats();
        info!(
            quotes = quotes.len(),
            successful = stats.successful_calls,
            failed = stats.failed_calls,
            dropped = stats.records_dropped,
            "Quote fetch complete"
        );

        quotes
    }

    async fn fetch_with_retry(&self, symbols: &[String]) -> Result<QuoteBatch, ProviderError> {
        let mut attempt: u32 = 0;

        loop {
            match self.source.fetch_batch(symbols).await {
                Ok(batch) => return Ok(batch),
                Err(e) if !e.is_recoverable() || attempt >= self.options.max_retries => {
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    let delay = self.options.retry_backoff * attempt;
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Retrying batch");
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Read the first available reference index among `codes`.
    pub async fn fetch_index(&self, codes: &[String]) -> Option<MarketQuote> {
        for code in codes {
            match self.source.fetch_index(code).await {
                Ok(Some(quote)) => return Some(quote),
                Ok(None) => debug!(code = %code, "No index data"),
                Err(e) => warn!(code = %code, error = %e, "Index request failed"),
            }
        }
        None
    }
}
