use barkeep_core::market::error::MarketError;
use barkeep_core::store::error::StoreError;
use thiserror::Error;

/// # Summary
/// 单个轮询周期内的失败原因，只影响当前交易对的当前周期。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CycleError {
    // 传输失败与解析失败对任务而言处理方式相同
    #[error("market error: {0}")]
    Market(#[from] MarketError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("task already running: {0}")]
    AlreadyRunning(String),
}
