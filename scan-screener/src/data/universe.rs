//! Stock universe sources.
//!
//! A screening pass starts from a list of codes. The list comes from the
//! config file, from Tushare Pro `stock_basic`, or from the synthetic
//! generator, and is then trimmed by [`filter_universe`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use super::{is_beijing_code, is_special_treatment_name, is_star_code, normalize_code};

/// One tradable symbol in the universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseEntry {
    /// Six-digit code
    pub symbol: String,
    /// Display name when the source knows it
    pub name: Option<String>,
}

impl UniverseEntry {
    pub fn new(symbol: &str, name: Option<String>) -> Self {
        Self {
            symbol: normalize_code(symbol),
            name,
        }
    }
}

/// Trait for stock universe providers.
#[async_trait]
pub trait UniverseSource: Send + Sync {
    /// Source name for logs
    fn name(&self) -> &'static str;

    /// Load the full, unfiltered universe.
    async fn load(&self) -> Result<Vec<UniverseEntry>>;
}

// ============================================================================
// Universe Filter
// ============================================================================

/// Exclusions applied before any quote is fetched.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniverseFilter {
    pub exclude_special_treatment: bool,
    pub exclude_beijing: bool,
    pub exclude_star: bool,
}

/// Apply exclusions and drop duplicate codes, keeping first occurrence order.
///
/// Returns the kept entries and the number removed.
pub fn filter_universe(
    entries: Vec<UniverseEntry>,
    filter: &UniverseFilter,
) -> (Vec<UniverseEntry>, usize) {
    let input = entries.len();
    let mut seen = HashSet::new();

    let kept: Vec<UniverseEntry> = entries
        .into_iter()
        .filter(|e| !e.symbol.is_empty())
        .filter(|e| !(filter.exclude_beijing && is_beijing_code(&e.symbol)))
        .filter(|e| !(filter.exclude_star && is_star_code(&e.symbol)))
        .filter(|e| {
            !(filter.exclude_special_treatment
                && e.name.as_deref().map_or(false, is_special_treatment_name))
        })
        .filter(|e| seen.insert(e.symbol.clone()))
        .collect();

    let removed = input - kept.len();
    (kept, removed)
}

// ============================================================================
// Static Universe
// ============================================================================

/// Universe from a fixed list of codes.
pub struct StaticUniverse {
    symbols: Vec<String>,
}

impl StaticUniverse {
    pub fn new(symbols: Vec<String>) -> Self {
        Self { symbols }
    }
}

#[async_trait]
impl UniverseSource for StaticUniverse {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn load(&self) -> Result<Vec<UniverseEntry>> {
        Ok(self
            .symbols
            .iter()
            .map(|s| UniverseEntry::new(s, None))
            .collect())
    }
}

// ============================================================================
// Tushare Universe
// ============================================================================

/// Listed A-shares from Tushare Pro `stock_basic`.
pub struct TushareUniverse {
    /// API token
    token: String,
    /// HTTP client
    client: reqwest::Client,
    /// API base URL
    base_url: String,
}

impl TushareUniverse {
    /// Create a new Tushare universe source
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            token: token.into(),
            client,
            base_url: base_url.into(),
        }
    }

    /// Create from config; `None` without a token.
    pub fn from_config(config: &scan_common::config::UniverseConfig) -> Option<Self> {
        config
            .tushare_token
            .clone()
            .filter(|t| !t.is_empty())
            .map(|token| Self::new(token, config.tushare_url.clone()))
    }
}

#[async_trait]
impl UniverseSource for TushareUniverse {
    fn name(&self) -> &'static str {
        "tushare"
    }

    async fn load(&self) -> Result<Vec<UniverseEntry>> {
        let request = TushareRequest {
            api_name: "stock_basic".to_string(),
            token: self.token.clone(),
            params: HashMap::from([("list_status".to_string(), "L".to_string())]),
            fields: "ts_code,name".to_string(),
        };

        let response = self
            .client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Tushare")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Tushare API error: {} - {}", status, body);
        }

        let result: TushareResponse = response
            .json()
            .await
            .context("Failed to parse Tushare response")?;

        parse_stock_basic(result)
    }
}

fn parse_stock_basic(result: TushareResponse) -> Result<Vec<UniverseEntry>> {
    if result.code != 0 {
        anyhow::bail!(
            "Tushare API returned error: {} - {}",
            result.code,
            result.msg.unwrap_or_default()
        );
    }

    let data = result
        .data
        .ok_or_else(|| anyhow::anyhow!("Tushare returned no data"))?;

    let code_idx = data
        .fields
        .iter()
        .position(|f| f == "ts_code")
        .ok_or_else(|| anyhow::anyhow!("Tushare response lacks ts_code"))?;
    let name_idx = data.fields.iter().position(|f| f == "name");

    Ok(data
        .items
        .iter()
        .filter_map(|row| {
            let code = row.get(code_idx)?.as_str()?;
            let name = name_idx
                .and_then(|i| row.get(i))
                .and_then(|v| v.as_str())
                .map(String::from);
            Some(UniverseEntry::new(code, name))
        })
        .collect())
}

#[derive(Debug, Serialize)]
struct TushareRequest {
    api_name: String,
    token: String,
    params: HashMap<String, String>,
    fields: String,
}

#[derive(Debug, Deserialize)]
struct TushareResponse {
    code: i32,
    msg: Option<String>,
    data: Option<TushareTable>,
}

#[derive(Debug, Deserialize)]
struct TushareTable {
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    items: Vec<Vec<serde_json::Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(symbol: &str, name: &str) -> UniverseEntry {
        UniverseEntry::new(symbol, Some(name.to_string()))
    }

    #[test]
    fn test_filter_universe() {
        let entries = vec![
            entry("600000.SH", "浦发银行"),
            entry("000001.SZ", "平安银行"),
            entry("600000.SH", "浦发银行"),
            entry("830799.BJ", "艾融软件"),
            entry("688981.SH", "中芯国际"),
            entry("600145.SH", "*ST新亿"),
        ];

        let filter = UniverseFilter {
            exclude_special_treatment: true,
            exclude_beijing: true,
            exclude_star: true,
        };
        let (kept, removed) = filter_universe(entries.clone(), &filter);
        let codes: Vec<&str> = kept.iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(codes, vec!["600000", "000001"]);
        assert_eq!(removed, 4);

        let (kept, _) = filter_universe(entries, &UniverseFilter::default());
        assert_eq!(kept.len(), 5); // only the duplicate goes
    }

    #[test]
    fn test_parse_stock_basic() {
        let result: TushareResponse = serde_json::from_str(
            r#"{"code": 0, "msg": "", "data": {
                "fields": ["ts_code", "name"],
                "items": [["000001.SZ", "平安银行"], ["600000.SH", "浦发银行"], [null, "x"]]
            }}"#,
        )
        .unwrap();

        let entries = parse_stock_basic(result).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].symbol, "000001");
        assert_eq!(entries[0].name.as_deref(), Some("平安银行"));
    }

    #[test]
    fn test_parse_stock_basic_error_code() {
        let result: TushareResponse =
            serde_json::from_str(r#"{"code": 40101, "msg": "token invalid", "data": null}"#)
                .unwrap();
        let err = parse_stock_basic(result).unwrap_err();
        assert!(err.to_string().contains("40101"));
    }

    #[tokio::test]
    async fn test_static_universe() {
        let universe = StaticUniverse::new(vec!["600000.SH".into(), "sz000001".into()]);
        let entries = universe.load().await.unwrap();
        assert_eq!(entries[0].symbol, "600000");
        assert_eq!(entries[1].symbol, "000001");
        assert_eq!(universe.name(), "static");
    }
}
