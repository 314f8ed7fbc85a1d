//! barkeep 领域核心：实体、端口 (Port) 与错误定义。
//!
//! 本 crate 不包含任何 IO 实现，所有基础设施均通过 trait 注入。

pub mod common;
pub mod config;

pub mod market {
    pub mod entity;
    pub mod error;
    pub mod port;
}

pub mod store {
    pub mod error;
    pub mod port;
}

#[cfg(feature = "test-utils")]
pub mod testing;

/// # Summary
/// 安装进程级 rustls 加密后端 (ring)。
///
/// # Logic
/// 1. 尝试将 ring 注册为默认 CryptoProvider。
/// 2. 若已有后端被安装（例如测试中重复调用），静默忽略。
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::trace!("rustls crypto provider already installed");
    }
}
