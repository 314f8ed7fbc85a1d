use barkeep_core::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_FILE_PREFIX: &str = "barkeep.log";

/// # Summary
/// 安装全局 tracing 订阅者。
///
/// # Logic
/// 1. `RUST_LOG` 优先，否则使用配置中的日志级别。
/// 2. 始终输出到标准输出。
/// 3. 配置了 `log.dir` 时额外写入按天滚动的文件（非阻塞写入）。
///
/// # Returns
/// 文件写入器的守卫，必须在进程生命周期内保持存活，否则缓冲日志会丢失。
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
