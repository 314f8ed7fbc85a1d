//! 按交易对轮询交易所 K 线并落库。
//!
//! `CandlesTask` 执行单个周期（许可 → 窗口 → 抓取 → 解析 → 落库），
//! `Scheduler` 以固定间隔为每个交易对驱动一个任务。

pub mod error;
pub mod scheduler;
pub mod task;

pub use error::{CycleError, SchedulerError};
pub use scheduler::Scheduler;
pub use task::{CandlesTask, CycleOutcome, TaskContext};
