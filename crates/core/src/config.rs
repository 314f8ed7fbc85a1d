use crate::common::Granularity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub ingest: IngestConfig,
    pub database: DatabaseConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub user_agent: String,
    // 以下三项全部提供时才对请求签名
    pub key: Option<String>,
    pub secret: Option<String>,
    pub passphrase: Option<String>,
    // 滑动窗口长度
    pub rate_window_ms: u64,
    // 窗口内允许的最大请求数（含进行中的请求）
    pub max_requests_within_window: usize,
    // 每个交易对两次轮询之间的固定延迟
    pub scheduler_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub granularity: Granularity,
    pub symbols: Vec<String>,
    pub dataset_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub dir: Option<String>,
}

/// # Summary
/// 配置校验错误。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl AppConfig {
    /// # Summary
    /// 在任何任务启动前拒绝不可用的配置。
    ///
    /// # Logic
    /// 1. 窗口长度、容量、轮询延迟必须为正。
    /// 2. 交易对列表不可为空，代码只能由字母数字、`-` 与 `_` 组成。
    /// 3. 数据集前缀必须以字母或 `_` 开头，保证派生出的表名是合法的 SQL 标识符。
    /// 4. 数据库连接数必须为正。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| ConfigError::Invalid {
            field,
            reason: reason.to_string(),
        };

        if self.exchange.rate_window_ms == 0 {
            return Err(invalid("exchange.rate_window_ms", "must be > 0"));
        }
        if self.exchange.max_requests_within_window == 0 {
            return Err(invalid("exchange.max_requests_within_window", "must be > 0"));
        }
        if self.exchange.scheduler_delay_ms == 0 {
            return Err(invalid("exchange.scheduler_delay_ms", "must be > 0"));
        }
        if self.ingest.symbols.is_empty() {
            return Err(invalid("ingest.symbols", "at least one symbol is required"));
        }
        if self.ingest.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(invalid("ingest.symbols", "blank symbol"));
        }
        if let Some(bad) = self.ingest.symbols.iter().find(|s| {
            !s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        }) {
            return Err(ConfigError::Invalid {
                field: "ingest.symbols",
                reason: format!("{bad:?} is not a product id"),
            });
        }
        if !self
            .ingest
            .dataset_prefix
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        {
            return Err(invalid(
                "ingest.dataset_prefix",
                "must start with an ASCII letter or '_'",
            ));
        }
        if self.database.max_connections == 0 {
            return Err(invalid("database.max_connections", "must be > 0"));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig {
                base_url: "https://api.pro.coinbase.com".to_string(),
                request_timeout_ms: 5_000,
                user_agent: "barkeep/0.1".to_string(),
                key: None,
                secret: None,
                passphrase: None,
                // 公共接口限制为每秒 3 次请求
                rate_window_ms: 1_000,
                max_requests_within_window: 3,
                scheduler_delay_ms: 1_000,
            },
            ingest: IngestConfig {
                granularity: Granularity::OneMinute,
                symbols: vec![
                    "ETH-EUR".to_string(),
                    "BTC-EUR".to_string(),
                    "XRP-EUR".to_string(),
                    "ETH-USD".to_string(),
                ],
                dataset_prefix: "coinbase".to_string(),
            },
            database: DatabaseConfig {
                path: "data/barkeep.db".to_string(),
                max_connections: 5,
            },
            log: LogConfig {
                level: "info".to_string(),
                dir: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.exchange.rate_window_ms, 1_000);
        assert_eq!(config.exchange.max_requests_within_window, 3);
        assert_eq!(config.ingest.granularity, Granularity::OneMinute);
        assert_eq!(config.ingest.symbols.len(), 4);
        assert!(config.exchange.key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = AppConfig::default();
        config.exchange.max_requests_within_window = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_requests_within_window"));
    }

    #[test]
    fn test_validate_rejects_empty_symbols() {
        let mut config = AppConfig::default();
        config.ingest.symbols.clear();
        assert!(config.validate().is_err());

        config.ingest.symbols = vec!["  ".to_string()];
        assert!(config.validate().is_err());

        config.ingest.symbols = vec!["ETH-EUR".to_string(), "BTC/EUR".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("BTC/EUR"));
    }

    #[test]
    fn test_validate_rejects_unusable_dataset_prefix() {
        let mut config = AppConfig::default();
        for prefix in ["", "1cb", "-cb"] {
            config.ingest.dataset_prefix = prefix.to_string();
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("dataset_prefix"), "{prefix}");
        }

        config.ingest.dataset_prefix = "_cb2".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_granularity_deserializes_from_short_name() {
        let json = r#"{"granularity":"5m","symbols":["BTC-USD"],"dataset_prefix":"cb"}"#;
        let ingest: IngestConfig = serde_json::from_str(json).unwrap();
        assert_eq!(ingest.granularity, Granularity::FiveMinutes);
    }
}
