use barkeep_core::market::entity::Bar;
use barkeep_core::market::error::MarketError;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

// 每组字段: epoch 秒, low, high, open, close, volume
const FIELDS_PER_GROUP: usize = 6;

/// # Summary
/// 将交易所返回的括号文本解析为有序的 K 线列表。
///
/// # Logic
/// 1. 去掉最外层的一对方括号；空输入或仅有括号时返回空列表。
/// 2. 依次切出 `[...]` 分组，分组之间允许逗号与空白。
/// 3. 每组按逗号拆成恰好 6 个字段，首字段为 epoch 秒（转换为毫秒时刻）。
/// 4. 其余 5 个字段按 low/high/open/close/volume 顺序解析为十进制数。
/// 5. 保持输入顺序输出。
///
/// # Arguments
/// * `symbol`: 交易对代码，写入每根 K 线。
/// * `raw`: 原始响应文本，例如 `[[1598120940,331.98,332.24,332.05,331.99,6.82750791]]`。
///
/// # Returns
/// 成功返回 K 线列表。任何一组字段数错位都会使整个响应解析失败，
/// 因为字段边界一旦偏移，后续分组也不再可信。
pub fn parse_candles(symbol: &str, raw: &str) -> Result<Vec<Bar>, MarketError> {
    let text = raw.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let inner = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| MarketError::Parse(format!("missing outer brackets: {}", preview(text))))?;

    let mut bars = Vec::new();
    let mut rest = inner.trim();
    while !rest.is_empty() {
        let body = rest.strip_prefix('[').ok_or_else(|| {
            MarketError::Parse(format!(
                "group #{} does not start with '[': {}",
                bars.len(),
                preview(rest)
            ))
        })?;
        let close = body.find(']').ok_or_else(|| {
            MarketError::Parse(format!("group #{} is not terminated", bars.len()))
        })?;

        bars.push(parse_group(symbol, &body[..close], bars.len())?);

        rest = body[close + 1..].trim_start();
        if let Some(after_comma) = rest.strip_prefix(',') {
            rest = after_comma.trim_start();
            if rest.is_empty() {
                return Err(MarketError::Parse("trailing comma after last group".into()));
            }
        }
    }

    Ok(bars)
}

fn parse_group(symbol: &str, group: &str, index: usize) -> Result<Bar, MarketError> {
    let fields: Vec<&str> = group.split(',').map(str::trim).collect();
    if fields.len() != FIELDS_PER_GROUP {
        return Err(MarketError::Parse(format!(
            "group #{} has {} fields, expected {}: [{}]",
            index,
            fields.len(),
            FIELDS_PER_GROUP,
            group
        )));
    }

    Ok(Bar {
        symbol: symbol.to_string(),
        timestamp: parse_epoch_seconds(fields[0])?,
        low: parse_decimal(fields[1], "low")?,
        high: parse_decimal(fields[2], "high")?,
        open: parse_decimal(fields[3], "open")?,
        close: parse_decimal(fields[4], "close")?,
        volume: parse_decimal(fields[5], "volume")?,
    })
}

fn parse_epoch_seconds(value: &str) -> Result<DateTime<Utc>, MarketError> {
    let seconds = value
        .parse::<i64>()
        .map_err(|_| MarketError::Parse(format!("invalid epoch: {value}")))?;
    seconds
        .checked_mul(1000)
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        .ok_or_else(|| MarketError::Parse(format!("epoch out of range: {value}")))
}

fn parse_decimal(value: &str, field: &str) -> Result<Decimal, MarketError> {
    // 交易所偶尔以科学计数法返回极小成交量，例如 1e-08
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .map_err(|_| MarketError::Parse(format!("invalid {field}: {value}")))
}

fn preview(text: &str) -> String {
    text.chars().take(64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_single_group() {
        let bars =
            parse_candles("ETH-EUR", "[[1598120940,331.98,332.24,332.05,331.99,6.82750791]]")
                .unwrap();
        assert_eq!(bars.len(), 1);
        let bar = &bars[0];
        assert_eq!(bar.symbol, "ETH-EUR");
        assert_eq!(bar.timestamp.timestamp_millis(), 1_598_120_940_000);
        assert_eq!(bar.low, dec!(331.98));
        assert_eq!(bar.high, dec!(332.24));
        assert_eq!(bar.open, dec!(332.05));
        assert_eq!(bar.close, dec!(331.99));
        assert_eq!(bar.volume, dec!(6.82750791));
    }

    #[test]
    fn test_empty_inputs_yield_no_bars() {
        assert!(parse_candles("X", "[]").unwrap().is_empty());
        assert!(parse_candles("X", "").unwrap().is_empty());
        assert!(parse_candles("X", "  [ ]\n").unwrap().is_empty());
    }

    #[test]
    fn test_preserves_input_order() {
        let raw = "[[1598121000,1,2,1.5,1.8,10],[1598120940,3,4,3.5,3.8,20], [1598120880,5,6,5.5,5.8,30]]";
        let bars = parse_candles("BTC-EUR", raw).unwrap();
        let seconds: Vec<i64> = bars.iter().map(|b| b.timestamp.timestamp()).collect();
        assert_eq!(seconds, vec![1_598_121_000, 1_598_120_940, 1_598_120_880]);
        assert_eq!(bars[2].volume, dec!(30));
    }

    #[test]
    fn test_wrong_field_count_aborts_whole_parse() {
        let five = "[[1598120940,331.98,332.24,332.05,331.99]]";
        assert!(matches!(parse_candles("X", five), Err(MarketError::Parse(_))));

        let seven = "[[1598120940,331.98,332.24,332.05,331.99,6.8,1]]";
        assert!(matches!(parse_candles("X", seven), Err(MarketError::Parse(_))));

        // 第二组错位时第一组也不会被返回
        let mixed = "[[1598120940,1,2,3,4,5],[1598121000,1,2,3,4]]";
        assert!(parse_candles("X", mixed).is_err());
    }

    #[test]
    fn test_rejects_non_bracket_payload() {
        let err = parse_candles("X", r#"{"message":"NotFound"}"#).unwrap_err();
        assert!(err.to_string().contains("missing outer brackets"));
        assert!(parse_candles("X", "[[1,2,3,4,5,6],]").is_err());
        assert!(parse_candles("X", "[[1,2,3,4,5,6]").is_err());
    }

    #[test]
    fn test_scientific_volume() {
        let bars = parse_candles("X", "[[1598120940,1,2,1,2,1e-8]]").unwrap();
        assert_eq!(bars[0].volume, dec!(0.00000001));
    }

    #[test]
    fn test_invalid_number_is_parse_error() {
        let err = parse_candles("X", "[[1598120940,abc,2,1,2,3]]").unwrap_err();
        assert_eq!(err, MarketError::Parse("invalid low: abc".into()));
    }
}
