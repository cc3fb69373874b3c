//! 日志初始化
//!
//! 安装 `tracing-subscriber` 的 fmt 订阅者，过滤规则取自 `RUST_LOG`（默认 `info`），
//! 并把 `log` crate 的记录桥接到 `tracing`。重复调用无副作用。

use tracing_subscriber::EnvFilter;

/// 以 `RUST_LOG`（默认 `info`）初始化日志
pub fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    install(filter);
}

/// 以给定过滤规则初始化日志，例如 `"barrett_systems=debug,info"`
///
/// 规则无法解析时退回 `info`。
pub fn init_logger_with_filter(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    install(filter);
}

fn install(filter: EnvFilter) {
    // fmt 订阅者默认已启用 log 桥接，失败说明已经安装过
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global subscriber already installed; keeping it");
    }
    tracing_log::LogTracer::init().ok();
}
