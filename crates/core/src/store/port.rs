use crate::market::entity::Bar;
use crate::store::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// # Summary
/// 时间序列存储契约，按交易对划分数据集。
///
/// # Invariants
/// - 对任意 `(symbol, timestamp)`，存储中至多存在一行。
/// - 数据集名称由 `common::dataset_name` 确定性推导。
#[async_trait]
pub trait BarStore: Send + Sync {
    /// # Summary
    /// 确保交易对的数据集存在。
    ///
    /// # Logic
    /// 幂等：数据集已存在时直接返回；并发创建最终只会生效一次。
    ///
    /// # Arguments
    /// * `symbol`: 交易对代码。
    ///
    /// # Returns
    /// 操作结果。
    async fn ensure_dataset(&self, symbol: &str) -> Result<(), StoreError>;

    /// # Summary
    /// 插入或更新一根 K 线。
    ///
    /// # Logic
    /// 1. 以 `(symbol, timestamp)` 为键尝试插入。
    /// 2. 键已存在时覆盖五个数值字段，键本身不变。
    /// 3. 数据集缺失时自动创建并重试一次。
    ///
    /// # Arguments
    /// * `bar`: 待写入的 K 线。
    ///
    /// # Returns
    /// 操作结果。
    async fn upsert(&self, bar: &Bar) -> Result<(), StoreError>;

    /// # Summary
    /// 按时间区间读取 K 线，结果按时间升序排列。
    ///
    /// # Arguments
    /// * `symbol`: 交易对代码。
    /// * `start`: 开始时间（包含）。
    /// * `end`: 结束时间（包含）。
    ///
    /// # Returns
    /// K 线列表。
    async fn load_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, StoreError>;
}
