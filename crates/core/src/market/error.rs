use thiserror::Error;

/// # Summary
/// 行情获取域错误枚举，覆盖传输失败与响应解析失败。
///
/// # Invariants
/// - 对轮询任务而言，所有变体的处理方式一致：记录日志、不推进游标、释放许可。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    // 网络层错误（连接失败、超时等）
    #[error("Network error: {0}")]
    Network(String),
    // 交易所返回了非 2xx 状态码
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    // 响应结构无法解析，如括号文本字段数错位
    #[error("Parse error: {0}")]
    Parse(String),
    // 请求在发出前即被拒绝，例如交易对代码含非法字符
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    // 私有接口需要完整的 API 凭证
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

impl MarketError {
    /// 是否为传输层错误（区别于解析错误）
    pub fn is_transport(&self) -> bool {
        matches!(self, MarketError::Network(_) | MarketError::Http { .. })
    }
}
