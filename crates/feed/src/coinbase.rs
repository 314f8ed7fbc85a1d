use async_trait::async_trait;
use barkeep_core::common::Granularity;
use barkeep_core::config::ExchangeConfig;
use barkeep_core::market::entity::{Account, Product};
use barkeep_core::market::error::MarketError;
use barkeep_core::market::port::{AccountProvider, CandleProvider};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, warn};

// 429 时的最大重试次数
const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const RETRY_BACKOFF_MS: u64 = 500;

/// # Summary
/// Coinbase API 凭证。
///
/// # Invariants
/// - `secret` 为 base64 编码的原始密钥。
#[derive(Clone)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
    pub passphrase: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// # Summary
/// Coinbase REST 行情提供者实现。
///
/// # Invariants
/// - 使用 `reqwest` 异步客户端进行通讯，超时由配置决定。
/// - 配置了凭证时每个请求都附带签名头。
#[derive(Clone)]
pub struct CoinbaseProvider {
    // 内部使用的 HTTP 客户端
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl CoinbaseProvider {
    /// # Summary
    /// 根据交易所配置创建提供者。
    ///
    /// # Logic
    /// 1. 安装 rustls 加密后端。
    /// 2. 设置 JSON 与 User-Agent 默认请求头。
    /// 3. 三项凭证齐全时启用签名。
    ///
    /// # Arguments
    /// * `config`: 交易所配置段。
    ///
    /// # Returns
    /// 成功返回提供者，客户端构建失败返回 `MarketError::Network`。
    pub fn new(config: &ExchangeConfig) -> Result<Self, MarketError> {
        barkeep_core::install_crypto_provider();

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| MarketError::Network(format!("invalid user agent: {e}")))?,
        );

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|e| MarketError::Network(format!("failed to build HTTP client: {e}")))?;

        let credentials = match (&config.key, &config.secret, &config.passphrase) {
            (Some(key), Some(secret), Some(passphrase)) => Some(Credentials {
                key: key.clone(),
                secret: secret.clone(),
                passphrase: passphrase.clone(),
            }),
            _ => None,
        };

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// # Summary
    /// 执行 GET 请求并返回响应正文。
    ///
    /// # Logic
    /// 1. 按需生成签名头。
    /// 2. 遇到 429 时线性退避重试，超过上限后返回 HTTP 错误。
    /// 3. 其他非 2xx 状态直接返回 `MarketError::Http`。
    async fn get_text(&self, request_path: &str) -> Result<String, MarketError> {
        let url = format!("{}{}", self.base_url, request_path);
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let mut request = self.client.get(&url);
            if let Some(credentials) = &self.credentials {
                let timestamp = Utc::now().timestamp().to_string();
                let signature = sign(&credentials.secret, &timestamp, "GET", request_path, "")?;
                request = request
                    .header("CB-ACCESS-KEY", &credentials.key)
                    .header("CB-ACCESS-SIGN", signature)
                    .header("CB-ACCESS-TIMESTAMP", timestamp)
                    .header("CB-ACCESS-PASSPHRASE", &credentials.passphrase);
            }

            let response = request
                .send()
                .await
                .map_err(|e| MarketError::Network(e.to_string()))?;
            let status = response.status();

            if status.as_u16() == 429 && attempts <= MAX_RATE_LIMIT_RETRIES {
                warn!(path = request_path, attempts, "rate limited by exchange, backing off");
                tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempts)))
                    .await;
                continue;
            }

            let body = response
                .text()
                .await
                .map_err(|e| MarketError::Network(e.to_string()))?;

            if !status.is_success() {
                return Err(MarketError::Http {
                    status: status.as_u16(),
                    body,
                });
            }
            return Ok(body);
        }
    }
}

/// # Summary
/// 生成 Coinbase 请求签名。
///
/// # Logic
/// 1. base64 解码密钥。
/// 2. 对 `timestamp + method + request_path + body` 计算 HMAC-SHA256。
/// 3. 将摘要进行 base64 编码。
pub fn sign(
    secret: &str,
    timestamp: &str,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<String, MarketError> {
    let key = STANDARD
        .decode(secret)
        .map_err(|e| MarketError::Network(format!("invalid API secret: {e}")))?;
    let mut mac = Hmac::<Sha256>::new_from_slice(&key)
        .map_err(|e| MarketError::Network(format!("invalid API secret: {e}")))?;
    mac.update(timestamp.as_bytes());
    mac.update(method.as_bytes());
    mac.update(request_path.as_bytes());
    mac.update(body.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// # Summary
/// 构造历史 K 线接口的请求路径（含查询串，签名需覆盖查询串）。
///
/// # Logic
/// 1. 交易对代码只允许 ASCII 字母数字、`-` 与 `_`，其余字符会破坏路径与签名，直接拒绝。
/// 2. 时间以毫秒精度的 RFC 3339 (UTC `Z`) 表示，粒度以秒表示。
pub fn candles_request_path(
    symbol: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    granularity: Granularity,
) -> Result<String, MarketError> {
    let valid = !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(MarketError::InvalidRequest(format!(
            "symbol is not a product id: {symbol:?}"
        )));
    }

    Ok(format!(
        "/products/{}/candles?start={}&end={}&granularity={}",
        symbol,
        start.to_rfc3339_opts(SecondsFormat::Millis, true),
        end.to_rfc3339_opts(SecondsFormat::Millis, true),
        granularity.seconds()
    ))
}

#[async_trait]
impl CandleProvider for CoinbaseProvider {
    /// # Summary
    /// 从 Coinbase 抓取历史 K 线原始文本。
    ///
    /// # Logic
    /// 1. 构建包含 start、end、granularity 的请求路径。
    /// 2. 发起请求并原样返回括号格式正文。
    async fn fetch_candles(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<String, MarketError> {
        let path = candles_request_path(symbol, start, end, granularity)?;
        debug!(symbol, path = %path, "getting historical rates");
        self.get_text(&path).await
    }

    async fn list_products(&self) -> Result<Vec<Product>, MarketError> {
        let body = self.get_text("/products").await?;
        serde_json::from_str::<Vec<Product>>(&body).map_err(|e| MarketError::Parse(e.to_string()))
    }
}

#[async_trait]
impl AccountProvider for CoinbaseProvider {
    /// # Summary
    /// 查询当前凭证下的账户余额。
    ///
    /// # Logic
    /// 1. 未配置凭证时不发请求，直接返回 `MissingCredentials`。
    /// 2. 签名请求 `GET /accounts` 并解码 JSON 数组。
    async fn list_accounts(&self) -> Result<Vec<Account>, MarketError> {
        if self.credentials.is_none() {
            return Err(MarketError::MissingCredentials(
                "listing accounts requires key, secret and passphrase".to_string(),
            ));
        }
        let body = self.get_text("/accounts").await?;
        serde_json::from_str::<Vec<Account>>(&body).map_err(|e| MarketError::Parse(e.to_string()))
    }
}
