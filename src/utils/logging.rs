// 日志系统模块

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use super::error::{app_error, AppResult};

/// 初始化日志系统
/// 支持通过 RUST_LOG 环境变量控制日志级别，默认为 info
pub fn init_logging() -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| app_error(format!("Failed to initialize logging: {}", e)))?;

    info!("Logging initialized");
    Ok(())
}
