use thiserror::Error;

/// # Summary
/// 存储层错误枚举，处理数据库连接、读写失败等问题。
///
/// # Invariants
/// - 主键冲突不属于错误，由 upsert 在语句内部吸收。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// 数据库操作失败
    #[error("Database error: {0}")]
    Database(String),
    /// 交易对的数据集（表）尚不存在
    #[error("Dataset missing: {0}")]
    DatasetMissing(String),
    /// 初始化存储失败
    #[error("Initialization error: {0}")]
    InitError(String),
}
