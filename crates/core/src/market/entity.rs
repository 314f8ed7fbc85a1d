use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// # Summary
/// 单根 OHLCV K 线，记录某交易对在一个粒度周期内的行情。
///
/// # Invariants
/// - 自然键为 `(symbol, timestamp)`，同一键在存储中至多一行。
/// - 创建后不可变；更新以整行替换数值字段的方式完成。
/// - `timestamp` 精度为毫秒。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    // 交易对代码 (例如: ETH-EUR)
    pub symbol: String,
    // K 线开始时间
    pub timestamp: DateTime<Utc>,
    // 最低价
    pub low: Decimal,
    // 最高价
    pub high: Decimal,
    // 开盘价
    pub open: Decimal,
    // 收盘价
    pub close: Decimal,
    // 成交量
    pub volume: Decimal,
}

/// # Summary
/// 交易所上架的交易对元数据，仅用于 `products` 命令输出。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    // 交易对代码 (例如: BTC-EUR)
    pub id: String,
    // 基础币种
    pub base_currency: String,
    // 计价币种
    pub quote_currency: String,
    // 交易状态 (online / delisted ...)
    #[serde(default)]
    pub status: Option<String>,
}

/// # Summary
/// 交易所账户余额，对应私有接口 `GET /accounts` 的单个条目。
///
/// # Invariants
/// - `balance = available + hold`，由交易所保证。
/// - 金额字段在 JSON 中以字符串形式出现，反序列化为十进制数。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    // 币种 (例如: EUR)
    pub currency: String,
    // 总余额
    pub balance: Decimal,
    // 可用余额
    pub available: Decimal,
    // 挂单冻结金额
    pub hold: Decimal,
    #[serde(default)]
    pub profile_id: Option<String>,
}
