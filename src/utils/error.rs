/*!
 * 错误处理模块
 *
 * Application-level plumbing (config file I/O, the binary) uses anyhow with
 * `.context(...)`. Domain modules define their own thiserror enums and convert
 * into these aliases at the edges.
 */

use anyhow::{anyhow, Result as AnyhowResult};

/// 统一的应用程序结果类型
pub type AppResult<T> = AnyhowResult<T>;

/// 统一的应用程序错误类型
pub type AppError = anyhow::Error;

/// 创建简单的应用程序错误
pub fn app_error(msg: impl Into<String>) -> AppError {
    anyhow!(msg.into())
}

/// 快速创建带上下文的错误并返回
#[macro_export]
macro_rules! app_bail {
    ($msg:literal $(,)?) => {
        return Err(anyhow::anyhow!($msg))
    };
    ($err:expr $(,)?) => {
        return Err(anyhow::anyhow!($err))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err(anyhow::anyhow!($fmt, $($arg)*))
    };
}
