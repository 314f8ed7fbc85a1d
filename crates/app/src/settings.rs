use barkeep_core::config::AppConfig;
use config::{Config, Environment, File, Map};
use std::path::Path;

const DEFAULT_CONFIG_FILE: &str = "config/default.toml";
const ENV_PREFIX: &str = "BARKEEP";

/// # Summary
/// 加载分层配置并校验。
///
/// # Logic
/// 1. 以 `AppConfig::default()` 作为最底层。
/// 2. 叠加显式指定的配置文件（必须存在），否则叠加可选的 `config/default.toml`。
/// 3. 叠加 `BARKEEP__` 前缀的环境变量，例如 `BARKEEP__EXCHANGE__SECRET`。
/// 4. 反序列化后执行 `validate()`。
///
/// # Arguments
/// * `path`: 命令行传入的配置文件路径。
///
/// # Returns
/// 合并后的配置；任何一层出错都作为启动失败返回。
pub fn load(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    load_from(path, None)
}

/// `env` 为 `None` 时读取进程环境变量，否则只使用给定的变量表
fn load_from(
    path: Option<&Path>,
    env: Option<Map<String, String>>,
) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let file = match path {
        Some(p) => File::from(p).required(true),
        None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let merged = Config::builder()
        .add_source(Config::try_from(&AppConfig::default())?)
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("ingest.symbols")
                .try_parsing(true)
                .source(env),
        )
        .build()?;

    let app_config: AppConfig = merged.try_deserialize()?;
    app_config.validate()?;
    Ok(app_config)
}
