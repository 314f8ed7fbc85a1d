use barkeep_core::common::Granularity;
use barkeep_core::config::AppConfig;
use barkeep_core::market::error::MarketError;
use barkeep_core::market::port::{AccountProvider, CandleProvider};
use barkeep_feed::coinbase::{CoinbaseProvider, sign};
use barkeep_feed::parser::parse_candles;
use chrono::{Duration, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// # Summary
/// 本地一次性 HTTP 桩服务，按顺序为每个连接返回一条预设响应。
///
/// # Returns
/// 服务基地址与收到的原始请求头列表。
async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();

    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !String::from_utf8_lossy(&buf).contains("\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            seen.lock().await.push(String::from_utf8_lossy(&buf).to_string());

            let reply = format!(
                "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        }
    });

    (format!("http://{addr}"), requests)
}

/// 从原始请求头中取出指定头的值（头名不区分大小写）
fn header(head: &str, name: &str) -> Option<String> {
    head.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
    })
}

fn provider_for(base_url: &str, signed: bool) -> CoinbaseProvider {
    let mut config = AppConfig::default().exchange;
    config.base_url = base_url.to_string();
    config.user_agent = "barkeep-test".to_string();
    if signed {
        config.key = Some("test-key".to_string());
        config.secret = Some("YmFya2VlcC10ZXN0LXNlY3JldA==".to_string());
        config.passphrase = Some("test-pass".to_string());
    }
    CoinbaseProvider::new(&config).unwrap()
}

#[tokio::test]
async fn test_fetch_candles_returns_raw_body() {
    let body = "[[1598120940,331.98,332.24,332.05,331.99,6.82750791]]";
    let (base, requests) = serve(vec![(200, body)]).await;
    let provider = provider_for(&base, false);

    let end = Utc.with_ymd_and_hms(2020, 8, 22, 18, 29, 0).unwrap();
    let start = end - Duration::minutes(1);
    let raw = provider
        .fetch_candles("ETH-EUR", start, end, Granularity::OneMinute)
        .await
        .unwrap();
    assert_eq!(raw, body);
    assert_eq!(parse_candles("ETH-EUR", &raw).unwrap().len(), 1);

    let requests = requests.lock().await;
    let head = requests[0].to_lowercase();
    assert!(head.starts_with(
        "get /products/eth-eur/candles?start=2020-08-22t18:28:00.000z&end=2020-08-22t18:29:00.000z&granularity=60 "
    ));
    assert!(head.contains("user-agent: barkeep-test"));
    assert!(!head.contains("cb-access-sign"));
}

#[tokio::test]
async fn test_signed_request_carries_auth_headers() {
    let (base, requests) = serve(vec![(200, "[]")]).await;
    let provider = provider_for(&base, true);

    let now = Utc::now();
    provider
        .fetch_candles("BTC-EUR", now - Duration::minutes(1), now, Granularity::OneMinute)
        .await
        .unwrap();

    let requests = requests.lock().await;
    let head = requests[0].to_lowercase();
    assert!(head.contains("cb-access-key: test-key"));
    assert!(head.contains("cb-access-sign: "));
    assert!(head.contains("cb-access-timestamp: "));
    assert!(head.contains("cb-access-passphrase: test-pass"));
}

#[tokio::test]
async fn test_rate_limited_request_is_retried() {
    let (base, requests) = serve(vec![(429, "{\"message\":\"slow down\"}"), (200, "[]")]).await;
    let provider = provider_for(&base, false);

    let now = Utc::now();
    let raw = provider
        .fetch_candles("XRP-EUR", now - Duration::minutes(1), now, Granularity::OneMinute)
        .await
        .unwrap();
    assert_eq!(raw, "[]");
    assert_eq!(requests.lock().await.len(), 2);
}

#[tokio::test]
async fn test_server_error_maps_to_http_error() {
    let (base, _) = serve(vec![(500, "{\"message\":\"boom\"}")]).await;
    let provider = provider_for(&base, false);

    let now = Utc::now();
    let err = provider
        .fetch_candles("ETH-USD", now - Duration::minutes(1), now, Granularity::OneMinute)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        MarketError::Http {
            status: 500,
            body: "{\"message\":\"boom\"}".to_string()
        }
    );
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let provider = provider_for(&format!("http://{addr}"), false);

    let now = Utc::now();
    let err = provider
        .fetch_candles("ETH-USD", now - Duration::minutes(1), now, Granularity::OneMinute)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::Network(_)));
}

#[tokio::test]
async fn test_list_products() -> anyhow::Result<()> {
    let body = r#"[{"id":"BTC-EUR","base_currency":"BTC","quote_currency":"EUR","status":"online"},
                   {"id":"ETH-USD","base_currency":"ETH","quote_currency":"USD"}]"#;
    let (base, _) = serve(vec![(200, body)]).await;
    let provider = provider_for(&base, false);

    let products = provider.list_products().await?;
    assert_eq!(products.len(), 2);
    assert_eq!(products[0].id, "BTC-EUR");
    assert_eq!(products[0].status.as_deref(), Some("online"));
    assert_eq!(products[1].quote_currency, "USD");
    assert!(products[1].status.is_none());
    Ok(())
}

#[tokio::test]
async fn test_list_accounts_sends_signed_request() -> anyhow::Result<()> {
    let body = r#"[{"id":"71452118-efc7-4cc4-8780-a5e22d4baa53","currency":"EUR",
                    "balance":"1500.2500000000","available":"1000.2500000000","hold":"500.0000000000",
                    "profile_id":"75da88c5-05bf-4f54-bc85-5c775bd68254"},
                   {"id":"e316cb9a-0808-4fd7-8914-97829c1925de","currency":"BTC",
                    "balance":"0.0000000000","available":"0","hold":"0.0000000000"}]"#;
    let (base, requests) = serve(vec![(200, body)]).await;
    let provider = provider_for(&base, true);

    let accounts = provider.list_accounts().await?;
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0].currency, "EUR");
    assert_eq!(accounts[0].balance, dec!(1500.25));
    assert_eq!(accounts[0].available, dec!(1000.25));
    assert_eq!(accounts[0].hold, dec!(500));
    assert!(accounts[0].profile_id.is_some());
    assert!(accounts[1].profile_id.is_none());

    let requests = requests.lock().await;
    let head = &requests[0];
    assert!(head.to_lowercase().starts_with("get /accounts "));
    assert_eq!(header(head, "CB-ACCESS-KEY").as_deref(), Some("test-key"));
    assert_eq!(header(head, "CB-ACCESS-PASSPHRASE").as_deref(), Some("test-pass"));

    let timestamp = header(head, "CB-ACCESS-TIMESTAMP").unwrap();
    let expected = sign("YmFya2VlcC10ZXN0LXNlY3JldA==", &timestamp, "GET", "/accounts", "")?;
    assert_eq!(header(head, "CB-ACCESS-SIGN"), Some(expected));
    Ok(())
}

#[tokio::test]
async fn test_list_accounts_requires_credentials() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let provider = provider_for(&format!("http://{addr}"), false);

    let err = provider.list_accounts().await.unwrap_err();
    assert!(matches!(err, MarketError::MissingCredentials(_)));
}

#[tokio::test]
async fn test_invalid_symbol_is_rejected_before_sending() {
    let (base, requests) = serve(vec![(200, "[]")]).await;
    let provider = provider_for(&base, false);

    let now = Utc::now();
    let err = provider
        .fetch_candles("ETH/EUR", now - Duration::minutes(1), now, Granularity::OneMinute)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidRequest(_)));
    assert!(requests.lock().await.is_empty());
}
