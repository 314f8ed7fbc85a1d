//! 供下游 crate 测试使用的内存替身 (`test-utils` feature)。

use crate::common::Granularity;
use crate::market::entity::{Bar, Product};
use crate::market::error::MarketError;
use crate::market::port::CandleProvider;
use crate::store::error::StoreError;
use crate::store::port::BarStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// # Summary
/// 基于 DashMap 的内存 K 线存储，遵循与 SQL 实现相同的 upsert 语义。
#[derive(Default)]
pub struct MemBarStore {
    datasets: DashMap<String, BTreeMap<DateTime<Utc>, Bar>>,
    upserts: AtomicUsize,
    fail_upserts: AtomicBool,
}

impl MemBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让后续所有 upsert 返回数据库错误
    pub fn set_failing(&self, failing: bool) {
        self.fail_upserts.store(failing, Ordering::SeqCst);
    }

    /// 成功执行的 upsert 次数
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// 交易对当前存储的全部 K 线（时间升序）
    pub fn bars(&self, symbol: &str) -> Vec<Bar> {
        self.datasets
            .get(symbol)
            .map(|d| d.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_dataset(&self, symbol: &str) -> bool {
        self.datasets.contains_key(symbol)
    }
}

#[async_trait]
impl BarStore for MemBarStore {
    async fn ensure_dataset(&self, symbol: &str) -> Result<(), StoreError> {
        self.datasets.entry(symbol.to_string()).or_default();
        Ok(())
    }

    async fn upsert(&self, bar: &Bar) -> Result<(), StoreError> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected failure".to_string()));
        }
        self.datasets
            .entry(bar.symbol.clone())
            .or_default()
            .insert(bar.timestamp, bar.clone());
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, StoreError> {
        Ok(self
            .bars(symbol)
            .into_iter()
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .collect())
    }
}

/// 一次抓取调用的参数快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub symbol: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub granularity: Granularity,
}

/// # Summary
/// 按脚本顺序返回预设响应的行情提供者。
///
/// # Invariants
/// - 脚本耗尽后返回空数组文本 `[]`。
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<String, MarketError>>>,
    calls: Mutex<Vec<FetchCall>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次抓取前先等待指定时长，用于模拟慢请求
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn push_ok(&self, body: &str) {
        self.responses.lock().await.push_back(Ok(body.to_string()));
    }

    pub async fn push_err(&self, err: MarketError) {
        self.responses.lock().await.push_back(Err(err));
    }

    /// 迄今为止收到的全部抓取调用
    pub async fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl CandleProvider for ScriptedProvider {
    async fn fetch_candles(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<String, MarketError> {
        self.calls.lock().await.push(FetchCall {
            symbol: symbol.to_string(),
            start,
            end,
            granularity,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok("[]".to_string()))
    }

    async fn list_products(&self) -> Result<Vec<Product>, MarketError> {
        Ok(vec![])
    }
}
