//! Integration tests for batched fetching against a mocked Gugudata API.
//!
//! Verifies batching, retry and failure accounting over real HTTP.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scan_screener::data::{FetchOptions, Fetcher, GugudataSource};

// ============================================================================
// Helpers
// ============================================================================

fn record(symbol: &str) -> Value {
    json!({
        "Symbol": symbol,
        "StockName": format!("测试{}", symbol),
        "Latest": 10.0,
        "Open": 9.8,
        "High": 10.05,
        "Low": 9.7,
        "LastClose": 9.75,
        "TradingVolume": 50000,
        "TradingAmount": 50000000,
        "TurnoverRate": 6.0,
        "ChangePercent": 2.56
    })
}

fn ok_body(symbols: &[&str]) -> Value {
    json!({
        "DataStatus": {"StatusCode": 100, "StatusDescription": "ok"},
        "Data": symbols.iter().map(|s| record(s)).collect::<Vec<_>>()
    })
}

async fn mount_batch(server: &MockServer, symbols: &[&str], response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/stock/cn/realtime"))
        .and(query_param("symbol", symbols.join(",")))
        .respond_with(response)
        .mount(server)
        .await;
}

fn create_test_fetcher(server: &MockServer) -> Fetcher<GugudataSource> {
    let source = GugudataSource::new(
        "test-key",
        server.uri(),
        Duration::from_secs(5),
        Duration::from_secs(5),
    );
    Fetcher::new(Arc::new(source), FetchOptions::immediate(2))
}

fn symbols(codes: &[&str]) -> Vec<String> {
    codes.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_one_failing_batch_of_three() {
    let server = MockServer::start().await;

    mount_batch(
        &server,
        &["600000", "600001"],
        ResponseTemplate::new(200).set_body_json(ok_body(&["600000", "600001"])),
    )
    .await;
    Mock::given(method("GET"))
        .and(query_param("symbol", "600002,600003"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream error"))
        .expect(4)
        .mount(&server)
        .await;
    mount_batch(
        &server,
        &["000001", "000002"],
        ResponseTemplate::new(200).set_body_json(ok_body(&["000001", "000002"])),
    )
    .await;

    let fetcher = create_test_fetcher(&server);
    let quotes = fetcher
        .fetch_all(&symbols(&[
            "600000", "600001", "600002", "600003", "000001", "000002",
        ]))
        .await;

    let got: Vec<&str> = quotes.iter().map(|q| q.symbol.as_str()).collect();
    assert_eq!(got, vec!["600000", "600001", "000001", "000002"]);

    let stats = fetcher.stats();
    assert_eq!(stats.total_calls, 3);
    assert_eq!(stats.successful_calls, 2);
    assert_eq!(stats.failed_calls, 1);
    assert_eq!(stats.retries, 3);
    assert_eq!(stats.quotes_returned, 4);
}

#[tokio::test]
async fn test_status_sentinel_failure_is_a_failed_batch() {
    let server = MockServer::start().await;
    mount_batch(
        &server,
        &["600000", "600001"],
        ResponseTemplate::new(200).set_body_json(json!({
            "DataStatus": {"StatusCode": 402, "StatusDescription": "quota exceeded"},
            "Data": []
        })),
    )
    .await;

    let fetcher = create_test_fetcher(&server);
    let quotes = fetcher.fetch_all(&symbols(&["600000", "600001"])).await;

    assert!(quotes.is_empty());
    assert_eq!(fetcher.stats().failed_calls, 1);
    assert_eq!(fetcher.stats().successful_calls, 0);
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = create_test_fetcher(&server);
    let quotes = fetcher.fetch_all(&symbols(&["600000"])).await;

    assert!(quotes.is_empty());
    assert_eq!(fetcher.stats().retries, 0);
    assert_eq!(fetcher.stats().failed_calls, 1);
}

#[tokio::test]
async fn test_malformed_records_are_counted() {
    let server = MockServer::start().await;
    mount_batch(
        &server,
        &["600000", "600001"],
        ResponseTemplate::new(200).set_body_json(json!({
            "DataStatus": {"StatusCode": 100},
            "Data": [
                record("600000"),
                {"Symbol": "600001", "StockName": "停牌", "Latest": 5.0, "TradingVolume": 0}
            ]
        })),
    )
    .await;

    let fetcher = create_test_fetcher(&server);
    let quotes = fetcher.fetch_all(&symbols(&["600000", "600001"])).await;

    assert_eq!(quotes.len(), 1);
    let quote = &quotes[0];
    // 50,000,000 yuan / (50,000 lots * 100)
    assert!((quote.vwap - 10.0).abs() < 1e-9);
    assert!(quote.deviation.abs() < 1e-9);
    assert_eq!(fetcher.stats().records_dropped, 1);
}

#[tokio::test]
async fn test_index_reading() {
    let server = MockServer::start().await;
    mount_batch(
        &server,
        &["sh000001"],
        ResponseTemplate::new(200).set_body_json(json!({
            "DataStatus": {"StatusCode": 100},
            "Data": [{
                "Symbol": "sh000001", "StockName": "上证指数", "Latest": 2970.0,
                "LastClose": 3000.0, "ChangePercent": -1.0
            }]
        })),
    )
    .await;

    let fetcher = create_test_fetcher(&server);
    let index = fetcher
        .fetch_index(&symbols(&["sz399001", "sh000001"]))
        .await
        .unwrap();

    assert_eq!(index.name, "上证指数");
    assert!((index.change_percent + 1.0).abs() < 1e-9);
}
