use crate::error::SchedulerError;
use crate::task::{CandlesTask, CycleOutcome};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// # Summary
/// 固定间隔调度器，为每个交易对维护一个独立的 tokio 协程。
///
/// # Invariants
/// - 同一交易对同时最多只有一个运行中的协程。
/// - 间隔从上一周期结束时开始计算（fixed delay 而非 fixed rate）。
/// - 协程被中止时正在进行的周期 future 被丢弃，许可由 `PermitGuard` 释放。
pub struct Scheduler {
    delay: Duration,
    // 运行中的任务句柄，Key 为交易对代码
    running: DashMap<String, AbortHandle>,
}

impl Scheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            running: DashMap::new(),
        }
    }

    /// # Summary
    /// 启动一个交易对的轮询协程。
    ///
    /// # Logic
    /// 1. 拒绝重复启动同一交易对。
    /// 2. 首个周期前确保数据集存在，失败只记录日志（upsert 会自愈）。
    /// 3. 循环执行周期并在每次结束后等待固定间隔。
    ///
    /// # Arguments
    /// * `task`: 轮询任务，所有权移交给协程。
    ///
    /// # Returns
    /// 交易对已在运行时返回 `SchedulerError::AlreadyRunning`。
    pub fn spawn(&self, mut task: CandlesTask) -> Result<(), SchedulerError> {
        let symbol = task.symbol().to_string();
        let entry = match self.running.entry(symbol.clone()) {
            Entry::Occupied(_) => return Err(SchedulerError::AlreadyRunning(symbol)),
            Entry::Vacant(v) => v,
        };

        let delay = self.delay;
        let handle = tokio::spawn(async move {
            if let Err(e) = task.store().ensure_dataset(task.symbol()).await {
                warn!(symbol = %task.symbol(), error = %e, "could not prepare dataset");
            }
            info!(symbol = %task.symbol(), delay_ms = delay.as_millis(), "candles task started");

            loop {
                let outcome = task.run_once().await;
                if let CycleOutcome::Completed { window, .. } = outcome {
                    debug!(symbol = %task.symbol(), cursor = %window.end, "cycle completed");
                }
                tokio::time::sleep(delay).await;
            }
        });

        entry.insert(handle.abort_handle());
        Ok(())
    }

    pub fn is_running(&self, symbol: &str) -> bool {
        self.running.contains_key(symbol)
    }

    /// 当前运行中的交易对（无序）
    pub fn symbols(&self) -> Vec<String> {
        self.running.iter().map(|e| e.key().clone()).collect()
    }

    /// 停止单个交易对的协程，返回它此前是否在运行
    pub fn stop(&self, symbol: &str) -> bool {
        match self.running.remove(symbol) {
            Some((_, handle)) => {
                handle.abort();
                info!(symbol, "candles task stopped");
                true
            }
            None => false,
        }
    }

    /// 中止所有协程
    pub fn shutdown(&self) {
        let symbols = self.symbols();
        for symbol in &symbols {
            self.stop(symbol);
        }
        info!(tasks = symbols.len(), "scheduler shut down");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for entry in self.running.iter() {
            entry.value().abort();
        }
    }
}
