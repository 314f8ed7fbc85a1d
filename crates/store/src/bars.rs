use async_trait::async_trait;
use barkeep_core::common::dataset_name;
use barkeep_core::config::DatabaseConfig;
use barkeep_core::market::entity::Bar;
use barkeep_core::store::error::StoreError;
use barkeep_core::store::port::BarStore;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use rust_decimal::Decimal;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

// 价格与成交量写入时保留的小数位
const PRICE_SCALE: u32 = 6;
const VOLUME_SCALE: u32 = 8;

type BarRow = (DateTime<Utc>, String, String, String, String, String);

/// BarStore 的 SQLite 实现，采用“一对一表”策略。
///
/// # Summary
/// 所有交易对共用一个数据库文件，每个交易对独占一张表，表名由 `dataset_name` 推导。
///
/// # Invariants
/// * 表名只包含 `[a-z0-9_]`，拼接进 SQL 时加双引号，以数字开头的前缀也合法。
/// * 十进制数以规范化文本存储，不经过浮点数，精度不丢失。
/// * `known` 只记录本进程内确认存在的表，用于跳过重复的建表语句。
pub struct SqliteBarStore {
    pool: SqlitePool,
    prefix: String,
    known: DashSet<String>,
}

impl SqliteBarStore {
    /// 打开（必要时创建）数据库文件并建立连接池。
    ///
    /// # Logic
    /// 1. 确保数据库文件所在目录存在。
    /// 2. 开启 `create_if_missing` 与 WAL 日志模式。
    /// 3. 按配置的连接数上限建立连接池。
    ///
    /// # Arguments
    /// * `config` - 数据库配置段。
    /// * `prefix` - 数据集名称前缀（如 `coinbase`）。
    ///
    /// # Returns
    /// * `Result<Self, StoreError>` - 存储实例或错误。
    pub async fn connect(config: &DatabaseConfig, prefix: &str) -> Result<Self, StoreError> {
        let path = Path::new(&config.path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::InitError(e.to_string()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::InitError(e.to_string()))?;

        info!(path = %config.path, "bar store opened");
        Ok(Self {
            pool,
            prefix: prefix.to_string(),
            known: DashSet::new(),
        })
    }

    /// 交易对对应的表名
    pub fn table_name(&self, symbol: &str) -> String {
        dataset_name(&self.prefix, symbol)
    }

    async fn insert_or_update(&self, table: &str, bar: &Bar) -> Result<(), StoreError> {
        let sql = format!(
            r#"
            INSERT INTO "{table}" (trade_date, lowest_price, highest_price, opening_price, closing_price, volume)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(trade_date) DO UPDATE SET
                lowest_price = excluded.lowest_price,
                highest_price = excluded.highest_price,
                opening_price = excluded.opening_price,
                closing_price = excluded.closing_price,
                volume = excluded.volume
            "#
        );

        sqlx::query(&sql)
            .bind(bar.timestamp)
            .bind(to_text(bar.low, PRICE_SCALE))
            .bind(to_text(bar.high, PRICE_SCALE))
            .bind(to_text(bar.open, PRICE_SCALE))
            .bind(to_text(bar.close, PRICE_SCALE))
            .bind(to_text(bar.volume, VOLUME_SCALE))
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| classify(table, e))
    }
}

fn to_text(value: Decimal, scale: u32) -> String {
    value.round_dp(scale).normalize().to_string()
}

fn from_text(value: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(value)
        .map_err(|e| StoreError::Database(format!("corrupt decimal {value}: {e}")))
}

/// 区分“表不存在”与其他数据库错误
fn classify(table: &str, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.message().contains("no such table") => {
            StoreError::DatasetMissing(table.to_string())
        }
        _ => StoreError::Database(err.to_string()),
    }
}

#[async_trait]
impl BarStore for SqliteBarStore {
    /// # Summary
    /// 确保交易对的表存在。
    ///
    /// # Logic
    /// 1. 已确认存在的表直接返回。
    /// 2. 执行 `CREATE TABLE IF NOT EXISTS`，并发创建由 SQLite 保证只生效一次。
    async fn ensure_dataset(&self, symbol: &str) -> Result<(), StoreError> {
        let table = self.table_name(symbol);
        if self.known.contains(&table) {
            return Ok(());
        }

        debug!(symbol, table = %table, "creating dataset if missing");
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                trade_date DATETIME PRIMARY KEY,
                lowest_price TEXT NOT NULL,
                highest_price TEXT NOT NULL,
                opening_price TEXT NOT NULL,
                closing_price TEXT NOT NULL,
                volume TEXT NOT NULL
            );
            "#
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        self.known.insert(table);
        Ok(())
    }

    /// # Summary
    /// 插入或更新一根 K 线。
    ///
    /// # Logic
    /// 1. 执行 `INSERT ... ON CONFLICT DO UPDATE`，主键冲突在语句内吸收。
    /// 2. 若表不存在，建表后重试一次。
    async fn upsert(&self, bar: &Bar) -> Result<(), StoreError> {
        let table = self.table_name(&bar.symbol);
        match self.insert_or_update(&table, bar).await {
            Err(StoreError::DatasetMissing(_)) => {
                debug!(
                    symbol = %bar.symbol,
                    table = %table,
                    "dataset missing, creating and retrying"
                );
                self.known.remove(&table);
                self.ensure_dataset(&bar.symbol).await?;
                self.insert_or_update(&table, bar).await
            }
            other => other,
        }
    }

    async fn load_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, StoreError> {
        let table = self.table_name(symbol);
        let rows = sqlx::query_as::<_, BarRow>(&format!(
            r#"
            SELECT trade_date, lowest_price, highest_price, opening_price, closing_price, volume
            FROM "{table}"
            WHERE trade_date >= ? AND trade_date <= ?
            ORDER BY trade_date ASC
            "#
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify(&table, e))?;

        rows.into_iter()
            .map(|r| {
                Ok(Bar {
                    symbol: symbol.to_string(),
                    timestamp: r.0,
                    low: from_text(&r.1)?,
                    high: from_text(&r.2)?,
                    open: from_text(&r.3)?,
                    close: from_text(&r.4)?,
                    volume: from_text(&r.5)?,
                })
            })
            .collect()
    }
}
