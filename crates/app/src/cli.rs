use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "barkeep")]
#[command(about = "Polls exchange candles per symbol and stores them in SQLite")]
#[command(version)]
pub struct Cli {
    /// 配置文件路径，缺省时尝试 config/default.toml
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Poll candles for every configured symbol until Ctrl-C
    Candles,
    /// Print the exchange product list and exit
    Products,
    /// Print the balance of every account (signed request)
    Accounts,
}
