//! Gugudata realtime API adapter for A-share quotes.
//!
//! # Endpoint
//! `GET {base}/stock/cn/realtime?appkey=...&symbol=600000,000001`
//!
//! # Response
//! ```json
//! {
//!   "DataStatus": {"StatusCode": 100, "StatusDescription": "..."},
//!   "Data": [{"Symbol": "600000", "StockName": "...", "Latest": 10.0, ...}]
//! }
//! ```
//!
//! `StatusCode == 100` is the only success sentinel. Volume is reported in
//! lots and amount in yuan.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::debug;

use scan_common::config::ProviderConfig;

use super::provider::{ProviderError, QuoteBatch, QuoteSource};
use super::{MarketQuote, RawQuote};

// ============================================================================
// Constants
// ============================================================================

/// Realtime quote endpoint
const REALTIME_ENDPOINT: &str = "/stock/cn/realtime";

/// Success sentinel in `DataStatus.StatusCode`
const STATUS_OK: i64 = 100;

// ============================================================================
// Gugudata Source
// ============================================================================

/// Gugudata adapter implementing [`QuoteSource`].
pub struct GugudataSource {
    /// API key
    appkey: String,
    /// Base URL without trailing slash
    base_url: String,
    /// HTTP client (batch timeout applied per client)
    client: reqwest::Client,
    /// Timeout for the index reading
    index_timeout: Duration,
}

impl GugudataSource {
    /// Create a new adapter.
    pub fn new(
        appkey: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        index_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            appkey: appkey.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            index_timeout,
        }
    }

    /// Create from provider config; `None` without an appkey.
    pub fn from_config(config: &ProviderConfig) -> Option<Self> {
        let appkey = config.appkey.clone().filter(|k| !k.is_empty())?;
        Some(Self::new(
            appkey,
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
            Duration::from_secs(config.index_timeout_secs),
        ))
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, REALTIME_ENDPOINT)
    }

    async fn request(
        &self,
        symbols: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<GuguRecord>, ProviderError> {
        let mut request = self
            .client
            .get(self.endpoint())
            .header("accept", "application/json")
            .query(&[("appkey", self.appkey.as_str()), ("symbol", symbols)]);

        if let Some(t) = timeout {
            request = request.timeout(t);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::Auth(format!("HTTP {}", status.as_u16())));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        parse_response(&body)
    }
}

#[async_trait]
impl QuoteSource for GugudataSource {
    fn name(&self) -> &'static str {
        "gugudata"
    }

    async fn fetch_batch(&self, symbols: &[String]) -> Result<QuoteBatch, ProviderError> {
        if symbols.is_empty() {
            return Err(ProviderError::InvalidRequest("empty symbol batch".into()));
        }

        let joined = symbols.join(",");
        debug!(count = symbols.len(), "Fetching quote batch from Gugudata");

        let records = self.request(&joined, None).await?;
        Ok(normalize_records(records))
    }

    async fn fetch_index(&self, code: &str) -> Result<Option<MarketQuote>, ProviderError> {
        let records = self.request(code, Some(self.index_timeout)).await?;

        Ok(records.into_iter().next().and_then(|record| {
            let raw = record.into_raw()?;
            (raw.price > 0.0 && raw.pre_close > 0.0).then(|| MarketQuote::from_raw(raw))
        }))
    }
}

// ============================================================================
// Response Parsing
// ============================================================================

/// Parse a response body, enforcing the status sentinel.
fn parse_response(body: &str) -> Result<Vec<GuguRecord>, ProviderError> {
    let response: GuguResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let status = response.data_status.unwrap_or_default();
    if status.status_code != STATUS_OK {
        return Err(ProviderError::Status {
            code: status.status_code,
            message: status.status_description.unwrap_or_default(),
        });
    }

    Ok(response.data.unwrap_or_default())
}

/// Convert records to quotes, counting the ones that cannot be used.
fn normalize_records(records: Vec<GuguRecord>) -> QuoteBatch {
    let mut batch = QuoteBatch::default();

    for record in records {
        match record.into_raw() {
            Some(raw) if raw.price > 0.0 && raw.volume > 0.0 => {
                batch.quotes.push(MarketQuote::from_raw(raw));
            }
            _ => batch.dropped += 1,
        }
    }

    batch
}

#[derive(Debug, Deserialize)]
struct GuguResponse {
    #[serde(rename = "DataStatus")]
    data_status: Option<GuguStatus>,
    #[serde(rename = "Data")]
    data: Option<Vec<GuguRecord>>,
}

#[derive(Debug, Default, Deserialize)]
struct GuguStatus {
    #[serde(rename = "StatusCode", default)]
    status_code: i64,
    #[serde(rename = "StatusDescription", default)]
    status_description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GuguRecord {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    stock_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    latest: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    open: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    high: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    low: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    last_close: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    trading_volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    trading_amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    turnover_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    change_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    change_pct: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    quantity_ratio: Option<f64>,
}

impl GuguRecord {
    fn into_raw(self) -> Option<RawQuote> {
        let symbol = self.symbol.filter(|s| !s.trim().is_empty())?;
        let price = self.latest?;

        Some(RawQuote {
            name: self.stock_name.unwrap_or_else(|| symbol.clone()),
            symbol,
            price,
            open: self.open.unwrap_or(0.0),
            high: self.high.unwrap_or(0.0),
            low: self.low.unwrap_or(0.0),
            pre_close: self.last_close.unwrap_or(0.0),
            volume: self.trading_volume.unwrap_or(0.0),
            amount: self.trading_amount.unwrap_or(0.0),
            turnover_rate: self.turnover_rate,
            volume_ratio: self.quantity_ratio,
            change_percent: self.change_percent.or(self.change_pct),
        })
    }
}

/// Accept numbers, numeric strings, empty strings and null.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "DataStatus": {"StatusCode": 100, "StatusDescription": "ok"},
        "Data": [
            {"Symbol": "600000", "StockName": "浦发银行", "Latest": 10.0, "Open": 9.8,
             "High": 10.05, "Low": 9.7, "LastClose": 9.75, "TradingVolume": 50000,
             "TradingAmount": 50000000, "TurnoverRate": 6.0, "ChangePercent": 2.56,
             "QuantityRatio": 1.3},
            {"Symbol": "000001", "StockName": "平安银行", "Latest": "11.20", "Open": "11.00",
             "High": "11.30", "Low": "10.90", "LastClose": "11.00", "TradingVolume": "80000",
             "TradingAmount": "89600000", "TurnoverRate": "", "ChangePct": 1.8},
            {"Symbol": "600001", "StockName": "停牌股", "Latest": 5.0, "TradingVolume": 0},
            {"StockName": "no symbol", "Latest": 3.0, "TradingVolume": 10}
        ]
    }"#;

    #[test]
    fn test_parse_and_normalize() {
        let records = parse_response(SAMPLE).unwrap();
        assert_eq!(records.len(), 4);

        let batch = normalize_records(records);
        assert_eq!(batch.quotes.len(), 2);
        assert_eq!(batch.dropped, 2);

        let first = &batch.quotes[0];
        assert_eq!(first.symbol, "600000");
        assert_eq!(first.name, "浦发银行");
        assert!((first.vwap - 10.0).abs() < 1e-9);
        assert_eq!(first.turnover_rate, Some(6.0));
        assert_eq!(first.volume_ratio, Some(1.3));

        let second = &batch.quotes[1];
        assert!((second.price - 11.2).abs() < 1e-9);
        assert!(second.turnover_rate.is_none());
        assert!((second.change_percent - 1.8).abs() < 1e-9);
    }

    #[test]
    fn test_status_sentinel() {
        let body = r#"{"DataStatus": {"StatusCode": 402, "StatusDescription": "quota"}, "Data": []}"#;
        match parse_response(body) {
            Err(ProviderError::Status { code, message }) => {
                assert_eq!(code, 402);
                assert_eq!(message, "quota");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_status_is_failure() {
        assert!(matches!(
            parse_response(r#"{"Data": []}"#),
            Err(ProviderError::Status { code: 0, .. })
        ));
    }

    #[test]
    fn test_malformed_body() {
        assert!(matches!(
            parse_response("<html>"),
            Err(ProviderError::Parse(_))
        ));
    }

    #[test]
    fn test_from_config_requires_appkey() {
        let mut config = ProviderConfig::default();
        assert!(GugudataSource::from_config(&config).is_none());

        config.appkey = Some("key".into());
        config.base_url = "https://api.example.com/".into();
        let source = GugudataSource::from_config(&config).unwrap();
        assert_eq!(source.endpoint(), "https://api.example.com/stock/cn/realtime");
        assert_eq!(source.name(), "gugudata");
    }

    // Run with: GUGU_APPKEY=xxx cargo test -- --ignored
    #[tokio::test]
    #[ignore = "requires valid API key"]
    async fn test_fetch_real_batch() {
        let key = std::env::var("GUGU_APPKEY").unwrap();
        let source = GugudataSource::new(
            key,
            "https://api.gugudata.com",
            Duration::from_secs(10),
            Duration::from_secs(8),
        );
        let batch = source
            .fetch_batch(&["600000".to_string(), "000001".to_string()])
            .await
            .unwrap();
        assert!(!batch.quotes.is_empty());
    }
}
