mod cli;
mod logging;
mod settings;

use barkeep_core::common::time::{RealTimeProvider, TimeProvider};
use barkeep_core::config::AppConfig;
use barkeep_core::market::port::{AccountProvider, CandleProvider};
use barkeep_core::store::port::BarStore;
use barkeep_feed::coinbase::CoinbaseProvider;
use barkeep_ingest::{CandlesTask, Scheduler, TaskContext};
use barkeep_limiter::TokenBucket;
use barkeep_store::bars::SqliteBarStore;
use clap::Parser;
use cli::{Cli, Command};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
///
/// # Logic
/// 1. 解析命令行并加载分层配置。
/// 2. 初始化全局日志。
/// 3. 按子命令装配组件并运行。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = settings::load(cli.config.as_deref())?;
    let _log_guard = logging::init(&config.log)?;

    let provider = Arc::new(CoinbaseProvider::new(&config.exchange)?);
    match cli.command {
        Command::Candles => run_candles(&config, provider).await,
        Command::Products => print_products(provider.as_ref()).await,
        Command::Accounts => print_accounts(provider.as_ref()).await,
    }
}

/// # Summary
/// 为每个交易对启动轮询任务，直到收到 Ctrl-C。
///
/// # Logic
/// 1. 打开 SQLite 存储，所有交易对共享同一连接池。
/// 2. 构造唯一的令牌桶并注入每个任务。
/// 3. 逐个交易对交给调度器。
/// 4. 等待退出信号后中止全部任务。
async fn run_candles(
    config: &AppConfig,
    provider: Arc<CoinbaseProvider>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn BarStore> =
        Arc::new(SqliteBarStore::connect(&config.database, &config.ingest.dataset_prefix).await?);
    let clock: Arc<dyn TimeProvider> = Arc::new(RealTimeProvider);
    let bucket = Arc::new(TokenBucket::with_clock(
        chrono::Duration::milliseconds(i64::try_from(config.exchange.rate_window_ms)?),
        config.exchange.max_requests_within_window,
        clock.clone(),
    ));

    let ctx = TaskContext {
        bucket,
        provider,
        store,
        clock,
    };

    let scheduler = Scheduler::new(Duration::from_millis(config.exchange.scheduler_delay_ms));
    for symbol in &config.ingest.symbols {
        scheduler.spawn(CandlesTask::new(
            symbol.as_str(),
            config.ingest.granularity,
            ctx.clone(),
        ))?;
    }
    info!(
        symbols = ?config.ingest.symbols,
        granularity = %config.ingest.granularity,
        capacity = config.exchange.max_requests_within_window,
        window_ms = config.exchange.rate_window_ms,
        "candles ingestion running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting...");
    scheduler.shutdown();
    Ok(())
}

async fn print_products(provider: &dyn CandleProvider) -> Result<(), Box<dyn std::error::Error>> {
    let products = provider.list_products().await?;
    for product in &products {
        println!(
            "{} {}/{} {}",
            product.id,
            product.base_currency,
            product.quote_currency,
            product.status.as_deref().unwrap_or("-")
        );
    }
    info!(count = products.len(), "products listed");
    Ok(())
}

/// # Summary
/// 每个账户打印一行余额，需要完整凭证。
async fn print_accounts(provider: &dyn AccountProvider) -> Result<(), Box<dyn std::error::Error>> {
    let accounts = provider.list_accounts().await?;
    for account in &accounts {
        println!(
            "{} balance={} available={} hold={} {}",
            account.currency, account.balance, account.available, account.hold, account.id
        );
    }
    info!(count = accounts.len(), "accounts listed");
    Ok(())
}
