use crate::common::Granularity;
use crate::market::entity::{Account, Product};
use crate::market::error::MarketError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// # Summary
/// 交易所 K 线数据提供者接口（原始数据源）。
///
/// # Invariants
/// - 实现者自行负责鉴权、重试与超时，调用方不做内联重试。
/// - 返回原始响应文本，解析由调用方完成。
#[async_trait]
pub trait CandleProvider: Send + Sync {
    /// # Summary
    /// 获取特定交易对在指定时间范围内的 K 线原始文本。
    ///
    /// # Logic
    /// 1. 构建带时间窗口和粒度的数据源请求。
    /// 2. 执行网络请求并返回响应正文。
    ///
    /// # Arguments
    /// * `symbol`: 交易对代码。
    /// * `start`: 开始时间。
    /// * `end`: 结束时间。
    /// * `granularity`: K 线粒度。
    ///
    /// # Returns
    /// 成功返回括号格式的原始文本，失败返回 `MarketError`。
    async fn fetch_candles(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<String, MarketError>;

    /// # Summary
    /// 列出交易所上架的全部交易对。
    ///
    /// # Returns
    /// 成功返回交易对元数据列表。
    async fn list_products(&self) -> Result<Vec<Product>, MarketError>;
}

/// # Summary
/// 交易所账户查询接口，与行情接口分离，只有配置了凭证的实现才可用。
#[async_trait]
pub trait AccountProvider: Send + Sync {
    /// # Summary
    /// 列出当前凭证下的全部账户余额。
    ///
    /// # Returns
    /// 成功返回账户列表；未配置凭证时返回 `MarketError::MissingCredentials`。
    async fn list_accounts(&self) -> Result<Vec<Account>, MarketError>;
}
