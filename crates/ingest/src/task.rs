use crate::error::CycleError;
use barkeep_core::common::time::TimeProvider;
use barkeep_core::common::{FetchWindow, Granularity};
use barkeep_core::market::error::MarketError;
use barkeep_core::market::port::CandleProvider;
use barkeep_core::store::port::BarStore;
use barkeep_feed::parser::parse_candles;
use barkeep_limiter::{PermitGuard, TokenBucket};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// # Summary
/// 所有交易对任务共享的协作者集合。
///
/// # Invariants
/// - `bucket` 是跨交易对共享的唯一可变状态。
#[derive(Clone)]
pub struct TaskContext {
    pub bucket: Arc<TokenBucket>,
    pub provider: Arc<dyn CandleProvider>,
    pub store: Arc<dyn BarStore>,
    pub clock: Arc<dyn TimeProvider>,
}

/// 单个周期的结果
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// 速率预算耗尽，本周期无任何副作用
    Skipped,
    Completed { window: FetchWindow, bars: usize },
    Failed { window: FetchWindow, error: CycleError },
}

/// # Summary
/// 单个交易对的 K 线轮询任务。
///
/// # Invariants
/// - `cursor` 只在抓取、解析、落库全部成功后前移。
/// - 任务独占自己的游标，不与其他交易对共享。
pub struct CandlesTask {
    symbol: String,
    granularity: Granularity,
    // 上一次成功覆盖的窗口终点
    cursor: DateTime<Utc>,
    ctx: TaskContext,
}

impl CandlesTask {
    /// # Summary
    /// 创建任务，游标初始化为 `now - granularity`。
    ///
    /// # Arguments
    /// * `symbol`: 交易对代码，例如 `ETH-EUR`。
    /// * `granularity`: K 线粒度。
    /// * `ctx`: 共享协作者。
    pub fn new(symbol: impl Into<String>, granularity: Granularity, ctx: TaskContext) -> Self {
        let cursor = ctx.clock.now() - granularity.duration();
        Self {
            symbol: symbol.into(),
            granularity,
            cursor,
            ctx,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn cursor(&self) -> DateTime<Utc> {
        self.cursor
    }

    pub(crate) fn store(&self) -> &Arc<dyn BarStore> {
        &self.ctx.store
    }

    /// # Summary
    /// 执行一个完整的轮询周期。
    ///
    /// # Logic
    /// 1. 向令牌桶申请许可，被拒绝则直接返回 `Skipped`，游标不变。
    /// 2. 许可交给 `PermitGuard`，任何退出路径（包括 future 被丢弃）都会释放。
    /// 3. 由游标与当前时间推导抓取窗口。
    /// 4. 抓取、解析并逐条 upsert，任一步失败则中止本周期。
    /// 5. 全部成功后把游标推进到窗口终点。
    ///
    /// # Returns
    /// 本周期的结果，错误不会向外传播。
    pub async fn run_once(&mut self) -> CycleOutcome {
        let Some(permit) = self.ctx.bucket.acquire(&self.symbol) else {
            trace!(symbol = %self.symbol, "rate budget exhausted, skipping cycle");
            return CycleOutcome::Skipped;
        };
        let _guard = PermitGuard::new(&self.ctx.bucket, permit);

        let window = FetchWindow::next(self.cursor, self.ctx.clock.now(), self.granularity);
        debug!(
            symbol = %self.symbol,
            start = %window.start,
            end = %window.end,
            "fetching candles"
        );

        match self.fetch_and_store(window).await {
            Ok(bars) => {
                self.cursor = window.end;
                info!(symbol = %self.symbol, bars, "candles persisted");
                CycleOutcome::Completed { window, bars }
            }
            Err(error) => {
                match &error {
                    CycleError::Market(MarketError::Parse(reason)) => {
                        warn!(symbol = %self.symbol, %reason, "malformed candles response")
                    }
                    CycleError::Market(e) => {
                        warn!(symbol = %self.symbol, error = %e, "candles fetch failed")
                    }
                    CycleError::Store(e) => {
                        error!(symbol = %self.symbol, error = %e, "persisting candles failed")
                    }
                }
                CycleOutcome::Failed { window, error }
            }
        }
    }

    async fn fetch_and_store(&self, window: FetchWindow) -> Result<usize, CycleError> {
        let raw = self
            .ctx
            .provider
            .fetch_candles(&self.symbol, window.start, window.end, self.granularity)
            .await?;
        let bars = parse_candles(&self.symbol, &raw)?;
        for bar in &bars {
            self.ctx.store.upsert(bar).await?;
        }
        Ok(bars.len())
    }
}
