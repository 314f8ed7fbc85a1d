pub mod time;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// K 线时间粒度枚举，取值限定为交易所接受的档位。
///
/// # Invariants
/// - 只能是 60/300/900/3600/21600/86400 秒之一，否则交易所会拒绝请求。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Granularity {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Granularity {
    /// 单根 K 线覆盖的秒数
    pub fn seconds(&self) -> i64 {
        match self {
            Granularity::OneMinute => 60,
            Granularity::FiveMinutes => 300,
            Granularity::FifteenMinutes => 900,
            Granularity::OneHour => 3_600,
            Granularity::SixHours => 21_600,
            Granularity::OneDay => 86_400,
        }
    }

    /// 单根 K 线覆盖的时长
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.seconds())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1m" | "60" => Ok(Granularity::OneMinute),
            "5m" | "300" => Ok(Granularity::FiveMinutes),
            "15m" | "900" => Ok(Granularity::FifteenMinutes),
            "1h" | "3600" => Ok(Granularity::OneHour),
            "6h" | "21600" => Ok(Granularity::SixHours),
            "1d" | "86400" => Ok(Granularity::OneDay),
            _ => Err(format!("Unknown Granularity: {}", s)),
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Granularity::OneMinute => write!(f, "1m"),
            Granularity::FiveMinutes => write!(f, "5m"),
            Granularity::FifteenMinutes => write!(f, "15m"),
            Granularity::OneHour => write!(f, "1h"),
            Granularity::SixHours => write!(f, "6h"),
            Granularity::OneDay => write!(f, "1d"),
        }
    }
}

/// # Summary
/// 单次抓取的时间窗口，每个周期重新计算，不落库。
///
/// # Invariants
/// - `start <= end`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    /// # Summary
    /// 根据上一次成功覆盖的窗口终点推导下一个抓取窗口。
    ///
    /// # Logic
    /// 1. 若游标落后当前时间超过一个粒度（例如进程停机后），丢弃积压，从 `now - granularity` 开始。
    /// 2. 否则从游标处无缝衔接。
    /// 3. 窗口终点总是 `now`。
    ///
    /// # Arguments
    /// * `last_end`: 上一个成功窗口的终点。
    /// * `now`: 当前时间。
    /// * `granularity`: K 线粒度。
    ///
    /// # Returns
    /// 新的抓取窗口。
    pub fn next(last_end: DateTime<Utc>, now: DateTime<Utc>, granularity: Granularity) -> Self {
        let width = granularity.duration();
        let start = if now - last_end > width {
            now - width
        } else {
            last_end
        };
        Self { start, end: now }
    }
}

/// # Summary
/// 根据交易对代码推导其数据集（表）名称。
///
/// # Logic
/// 1. 代码转小写。
/// 2. 所有非 ASCII 字母数字的字符替换为 `_`。
/// 3. 加上前缀与 `_` 连接。
///
/// # Invariants
/// - 该规则是对外契约，读侧报表服务依赖同一命名。
/// - 输出只包含 `[a-z0-9_]`，可安全拼接进 SQL 标识符。
pub fn dataset_name(prefix: &str, symbol: &str) -> String {
    let normalize = |s: &str| -> String {
        s.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect()
    };
    format!("{}_{}", normalize(prefix), normalize(symbol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_granularity_round_trip_text() {
        for g in [
            Granularity::OneMinute,
            Granularity::FiveMinutes,
            Granularity::FifteenMinutes,
            Granularity::OneHour,
            Granularity::SixHours,
            Granularity::OneDay,
        ] {
            assert_eq!(g.to_string().parse::<Granularity>().unwrap(), g);
        }
        assert_eq!("60".parse::<Granularity>().unwrap(), Granularity::OneMinute);
        assert!("2m".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_window_drops_stale_backlog() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let last_end = now - Duration::minutes(30);
        let window = FetchWindow::next(last_end, now, Granularity::OneMinute);
        assert_eq!(window.start, now - Duration::minutes(1));
        assert_eq!(window.end, now);
    }

    #[test]
    fn test_window_is_contiguous_within_granularity() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let last_end = now - Duration::seconds(45);
        let window = FetchWindow::next(last_end, now, Granularity::OneMinute);
        assert_eq!(window.start, last_end);
        assert_eq!(window.end, now);

        // 恰好落后一个粒度时仍然衔接
        let last_end = now - Duration::minutes(1);
        let window = FetchWindow::next(last_end, now, Granularity::OneMinute);
        assert_eq!(window.start, last_end);
    }

    #[test]
    fn test_dataset_name_normalizes_separators() {
        assert_eq!(dataset_name("coinbase", "ETH-EUR"), "coinbase_eth_eur");
        assert_eq!(dataset_name("coinbase", "btc/usd.x"), "coinbase_btc_usd_x");
        assert_eq!(dataset_name("Coin-Base", "XRP-EUR"), "coin_base_xrp_eur");
    }
}
