use barkeep_core::common::time::{RealTimeProvider, TimeProvider};
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use tracing::trace;
use uuid::Uuid;

/// # Summary
/// 准入许可，代表一次进行中或刚完成的 REST 请求。
///
/// # Invariants
/// - 只能由 `TokenBucket::acquire` 创建。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permit {
    id: Uuid,
    owner: String,
}

impl Permit {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

/// 令牌桶内部持有的许可记录
#[derive(Debug)]
struct PermitRecord {
    id: Uuid,
    owner: String,
    finished_at: Option<DateTime<Utc>>,
}

/// # Summary
/// 某一时刻桶内的占用快照。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketUsage {
    // 尚未释放的许可数
    pub running: usize,
    // 窗口内已释放的许可数
    pub completed: usize,
}

impl BucketUsage {
    pub fn total(&self) -> usize {
        self.running + self.completed
    }
}

/// # Summary
/// 滑动窗口准入控制器：一次计数同时约束并发上限与窗口内的请求速率。
///
/// # Invariants
/// - `acquire`、`release` 与过期清理在同一把锁内完成，检查与写入不会被交错。
/// - 任一时刻 `running + completed` 不会超过 `capacity`。
/// - 不阻塞：容量耗尽时 `acquire` 立即返回 `None`。
pub struct TokenBucket {
    // 滑动窗口长度
    window: Duration,
    // 窗口内允许的最大请求数
    capacity: usize,
    // 许可集合，唯一的跨任务共享状态
    permits: Mutex<Vec<PermitRecord>>,
    clock: Arc<dyn TimeProvider>,
}

impl TokenBucket {
    /// # Summary
    /// 使用系统时钟创建令牌桶。
    ///
    /// # Arguments
    /// * `window`: 滑动窗口长度。
    /// * `capacity`: 窗口内允许的最大请求数。
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self::with_clock(window, capacity, Arc::new(RealTimeProvider))
    }

    /// 使用注入的时钟创建令牌桶
    pub fn with_clock(window: Duration, capacity: usize, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            window,
            capacity,
            permits: Mutex::new(Vec::new()),
            clock,
        }
    }

    /// # Summary
    /// 申请一个许可。
    ///
    /// # Logic
    /// 1. 加锁并清理已滑出窗口的记录。
    /// 2. 统计未释放的许可数与窗口内已释放的许可数。
    /// 3. 二者之和小于容量时登记新许可并返回，否则拒绝。
    ///
    /// # Arguments
    /// * `owner`: 申请方标识（交易对代码）。
    ///
    /// # Returns
    /// 成功返回 `Some(Permit)`；容量耗尽返回 `None`，这是正常的背压信号而非错误。
    pub fn acquire(&self, owner: &str) -> Option<Permit> {
        let mut permits = self.permits.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now();
        Self::sweep(&mut permits, now, self.window);

        let usage = Self::count(&permits, now, self.window);
        trace!(
            owner,
            running = usage.running,
            completed = usage.completed,
            capacity = self.capacity,
            "token bucket state"
        );

        if usage.total() >= self.capacity {
            return None;
        }

        let permit = Permit {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
        };
        permits.push(PermitRecord {
            id: permit.id,
            owner: permit.owner.clone(),
            finished_at: None,
        });
        Some(permit)
    }

    /// # Summary
    /// 释放许可。
    ///
    /// # Logic
    /// 1. 将匹配且尚未结束的记录标记为完成时间 `now`。
    /// 2. 未知或已释放的许可静默忽略。
    /// 3. 清理已滑出窗口的记录。
    pub fn release(&self, permit: &Permit) {
        self.release_id(permit.id);
    }

    /// 按许可 ID 释放，语义同 `release`
    pub fn release_id(&self, id: Uuid) {
        let mut permits = self.permits.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now();
        if let Some(record) = permits
            .iter_mut()
            .find(|r| r.id == id && r.finished_at.is_none())
        {
            trace!(owner = %record.owner, permit = %id, "permit released");
            record.finished_at = Some(now);
        }
        Self::sweep(&mut permits, now, self.window);
    }

    /// 当前占用快照
    pub fn usage(&self) -> BucketUsage {
        let permits = self.permits.lock().unwrap_or_else(|e| e.into_inner());
        Self::count(&permits, self.clock.now(), self.window)
    }

    fn count(permits: &[PermitRecord], now: DateTime<Utc>, window: Duration) -> BucketUsage {
        permits
            .iter()
            .fold(BucketUsage { running: 0, completed: 0 }, |mut acc, r| {
                match r.finished_at {
                    None => acc.running += 1,
                    Some(at) if now - at <= window => acc.completed += 1,
                    Some(_) => {}
                }
                acc
            })
    }

    fn sweep(permits: &mut Vec<PermitRecord>, now: DateTime<Utc>, window: Duration) {
        permits.retain(|r| match r.finished_at {
            Some(at) => now - at <= window,
            None => true,
        });
    }
}

/// # Summary
/// 许可守卫：离开作用域时自动释放许可。
///
/// # Invariants
/// - 正常返回、提前返回、panic 以及 future 被丢弃时都会释放，许可不会泄漏。
pub struct PermitGuard<'a> {
    bucket: &'a TokenBucket,
    permit: Permit,
}

impl<'a> PermitGuard<'a> {
    pub fn new(bucket: &'a TokenBucket, permit: Permit) -> Self {
        Self { bucket, permit }
    }

    pub fn permit(&self) -> &Permit {
        &self.permit
    }
}

impl Drop for PermitGuard<'_> {
    fn drop(&mut self) {
        self.bucket.release(&self.permit);
    }
}
