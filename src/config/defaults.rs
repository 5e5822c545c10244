/*!
 * 配置系统默认值
 */

use serde_json::{json, Value};

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_DEBOUNCE_MS: u64 = 2000;
pub const DEFAULT_COMMIT_PREFIX: &str = "[auto]";
pub const DEFAULT_CONFLICT_STRATEGY: &str = "manual";
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 5;
/// 内存上限（MB），0 表示不限制
pub const DEFAULT_MAX_MEMORY_MB: u64 = 1024;

/// 创建默认配置
///
/// `remote.url` and `local.codeDirectory` have no usable default; they are
/// present as empty strings so the file written for a fresh install shows
/// every key.
pub fn create_default_config() -> Value {
    json!({
        "remote": {
            "url": "",
            "branch": DEFAULT_BRANCH,
            "autoPush": true,
            "autoPull": true,
            "syncIntervalSeconds": DEFAULT_SYNC_INTERVAL_SECS,
            "networkTimeoutSeconds": DEFAULT_NETWORK_TIMEOUT_SECS
        },
        "local": {
            "codeDirectory": "",
            "watchPatterns": [],
            "excludePatterns": [],
            "debounceMillis": DEFAULT_DEBOUNCE_MS
        },
        "sync": {
            "commitPrefix": DEFAULT_COMMIT_PREFIX,
            "conflictStrategy": DEFAULT_CONFLICT_STRATEGY,
            "stopTimeoutSeconds": DEFAULT_STOP_TIMEOUT_SECS,
            "maxMemoryMb": DEFAULT_MAX_MEMORY_MB
        }
    })
}
