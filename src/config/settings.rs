/*!
 * 同步设置
 *
 * Typed, validated view over [`ConfigStore`]. Missing optional keys resolve
 * to the documented defaults; required keys and malformed values surface as
 * [`ConfigError`] naming the exact field.
 */

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::defaults::*;
use super::store::ConfigStore;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting `{field}`")]
    Missing { field: String },

    #[error("invalid setting `{field}`: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    pub fn field(&self) -> &str {
        match self {
            Self::Missing { field } | Self::Invalid { field, .. } => field,
        }
    }

    fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// How conflicts are handled. Only pausing for manual resolution is
/// implemented; automatic "ours"/"theirs" resolution is rejected at load time
/// rather than silently treated as manual.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    #[default]
    Manual,
}

impl FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "ours" | "theirs" => Err(format!(
                "strategy '{}' is not supported, only 'manual' is available",
                s
            )),
            other => Err(format!("unknown strategy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub remote_url: String,
    pub branch: String,
    pub auto_push: bool,
    pub auto_pull: bool,
    pub sync_interval: Duration,
    pub network_timeout: Duration,
    pub code_directory: PathBuf,
    pub watch_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub debounce: Duration,
    pub commit_prefix: String,
    pub conflict_strategy: ConflictStrategy,
    pub stop_timeout: Duration,
    /// Resident memory ceiling in MB; crossing it stops the engine. 0 disables
    /// the check.
    pub max_memory_mb: u64,
    /// Where the checkpoint database and quarantine live. `None` means inside
    /// the repository's git dir.
    pub state_directory: Option<PathBuf>,
}

impl SyncSettings {
    /// Settings with every optional value at its default.
    pub fn new(remote_url: impl Into<String>, code_directory: impl Into<PathBuf>) -> Self {
        Self {
            remote_url: remote_url.into(),
            branch: DEFAULT_BRANCH.to_string(),
            auto_push: true,
            auto_pull: true,
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            network_timeout: Duration::from_secs(DEFAULT_NETWORK_TIMEOUT_SECS),
            code_directory: code_directory.into(),
            watch_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            commit_prefix: DEFAULT_COMMIT_PREFIX.to_string(),
            conflict_strategy: ConflictStrategy::Manual,
            stop_timeout: Duration::from_secs(DEFAULT_STOP_TIMEOUT_SECS),
            max_memory_mb: DEFAULT_MAX_MEMORY_MB,
            state_directory: None,
        }
    }

    pub fn from_store(store: &ConfigStore) -> Result<Self, ConfigError> {
        let remote_url = required_str(store, "remote.url")?;
        let code_directory = PathBuf::from(required_str(store, "local.codeDirectory")?);

        let mut settings = Self::new(remote_url, code_directory);

        if let Some(branch) = optional_str(store, "remote.branch")? {
            if branch.trim().is_empty() {
                return Err(ConfigError::invalid("remote.branch", "must not be empty"));
            }
            settings.branch = branch;
        }
        if let Some(v) = optional_bool(store, "remote.autoPush")? {
            settings.auto_push = v;
        }
        if let Some(v) = optional_bool(store, "remote.autoPull")? {
            settings.auto_pull = v;
        }
        if let Some(secs) = optional_u64(store, "remote.syncIntervalSeconds")? {
            settings.sync_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = optional_u64(store, "remote.networkTimeoutSeconds")? {
            settings.network_timeout = Duration::from_secs(secs);
        }
        if let Some(patterns) = optional_str_list(store, "local.watchPatterns")? {
            settings.watch_patterns = patterns;
        }
        if let Some(patterns) = optional_str_list(store, "local.excludePatterns")? {
            settings.exclude_patterns = patterns;
        }
        if let Some(ms) = optional_u64(store, "local.debounceMillis")? {
            settings.debounce = Duration::from_millis(ms);
        }
        if let Some(prefix) = optional_str(store, "sync.commitPrefix")? {
            settings.commit_prefix = prefix;
        }
        if let Some(strategy) = optional_str(store, "sync.conflictStrategy")? {
            settings.conflict_strategy = strategy
                .parse()
                .map_err(|msg: String| ConfigError::invalid("sync.conflictStrategy", msg))?;
        }
        if let Some(secs) = optional_u64(store, "sync.stopTimeoutSeconds")? {
            settings.stop_timeout = Duration::from_secs(secs);
        }
        if let Some(mb) = optional_u64(store, "sync.maxMemoryMb")? {
            settings.max_memory_mb = mb;
        }
        if let Some(dir) = optional_str(store, "sync.stateDirectory")? {
            if !dir.trim().is_empty() {
                settings.state_directory = Some(PathBuf::from(dir));
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Memory ceiling in bytes, `None` when disabled.
    pub fn memory_limit(&self) -> Option<u64> {
        (self.max_memory_mb > 0).then(|| self.max_memory_mb.saturating_mul(1024 * 1024))
    }

    /// Checks invariants that hold regardless of where the settings came from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "remote.url".to_string(),
            });
        }
        if self.code_directory.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                field: "local.codeDirectory".to_string(),
            });
        }
        if self.sync_interval.is_zero() {
            return Err(ConfigError::invalid(
                "remote.syncIntervalSeconds",
                "must be at least 1 second",
            ));
        }
        if self.network_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "remote.networkTimeoutSeconds",
                "must be at least 1 second",
            ));
        }
        if self.stop_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "sync.stopTimeoutSeconds",
                "must be at least 1 second",
            ));
        }
        for (field, patterns) in [
            ("local.watchPatterns", &self.watch_patterns),
            ("local.excludePatterns", &self.exclude_patterns),
        ] {
            for pattern in patterns {
                glob::Pattern::new(pattern)
                    .map_err(|e| ConfigError::invalid(field, format!("'{}': {}", pattern, e)))?;
            }
        }
        Ok(())
    }
}

fn required_str(store: &ConfigStore, field: &str) -> Result<String, ConfigError> {
    match optional_str(store, field)? {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing {
            field: field.to_string(),
        }),
    }
}

fn optional_str(store: &ConfigStore, field: &str) -> Result<Option<String>, ConfigError> {
    match store.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ConfigError::invalid(
            field,
            format!("expected a string, found {}", other),
        )),
    }
}

fn optional_bool(store: &ConfigStore, field: &str) -> Result<Option<bool>, ConfigError> {
    match store.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(ConfigError::invalid(
            field,
            format!("expected true or false, found {}", other),
        )),
    }
}

fn optional_u64(store: &ConfigStore, field: &str) -> Result<Option<u64>, ConfigError> {
    match store.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| {
            ConfigError::invalid(field, format!("expected a non-negative integer, found {}", n))
        }),
        Some(other) => Err(ConfigError::invalid(
            field,
            format!("expected a number, found {}", other),
        )),
    }
}

fn optional_str_list(store: &ConfigStore, field: &str) -> Result<Option<Vec<String>>, ConfigError> {
    match store.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ConfigError::invalid(field, format!("expected strings, found {}", item))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(other) => Err(ConfigError::invalid(
            field,
            format!("expected a list of patterns, found {}", other),
        )),
    }
}
