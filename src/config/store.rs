/*!
 * 键值配置存储
 *
 * Nested sections addressed with dotted keys (`remote.url`). Values loaded
 * from disk are merged over the defaults so every documented key resolves.
 */

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, info, warn};

use super::defaults::create_default_config;
use super::paths::ConfigPaths;
use super::profile::Profile;
use crate::utils::error::AppResult;

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    values: Value,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            path: None,
            values: create_default_config(),
        }
    }
}

impl ConfigStore {
    /// In-memory store seeded with the defaults and the given overrides.
    pub fn from_value(overrides: Value) -> Self {
        let mut values = create_default_config();
        merge_values(&mut values, overrides);
        Self { path: None, values }
    }

    /// Loads the platform default config file, see [`ConfigPaths`].
    pub async fn load_default() -> AppResult<Self> {
        let paths = ConfigPaths::new()?;
        Self::load(paths.config_file()).await
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    pub async fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut values = create_default_config();

        if fs::try_exists(&path).await.unwrap_or(false) {
            let content = fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let loaded: Value = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            if !loaded.is_object() {
                crate::app_bail!("Config root must be an object: {}", path.display());
            }
            merge_values(&mut values, loaded);
            info!("Loaded config from {}", path.display());
        } else {
            warn!("Config file {} not found, using defaults", path.display());
        }

        Ok(Self {
            path: Some(path),
            values,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn values(&self) -> &Value {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .try_fold(&self.values, |node, part| node.as_object()?.get(part))
    }

    pub fn set(&mut self, key: &str, value: Value) {
        let mut parts: Vec<&str> = key.split('.').collect();
        let Some(last) = parts.pop() else {
            return;
        };

        let mut node = &mut self.values;
        for part in parts {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(map) = node else {
                return;
            };
            node = map
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }

        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        if let Value::Object(map) = node {
            map.insert(last.to_string(), value);
        }
        debug!("Config key {} updated", key);
    }

    /// Writes the store back to the file it was loaded from.
    pub async fn save(&self) -> AppResult<()> {
        let Some(path) = &self.path else {
            crate::app_bail!("Config store has no backing file");
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config dir: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&self.values).context("Failed to serialize config")?;
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Points the engine at another account's repository. This is the only
    /// path through which the engine writes configuration.
    pub async fn apply_profile(&mut self, profile: &Profile) -> AppResult<()> {
        self.set("remote.url", Value::String(profile.repo_url.clone()));
        self.set(
            "local.codeDirectory",
            Value::String(profile.code_directory.to_string_lossy().into_owned()),
        );
        if let Some(branch) = &profile.branch {
            self.set("remote.branch", Value::String(branch.clone()));
        }
        info!("Switched config to profile {}", profile.name);

        if self.path.is_some() {
            self.save().await?;
        }
        Ok(())
    }
}

/// Recursively merges `overlay` into `base`; objects merge key by key,
/// anything else replaces.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_values(existing, value)
                    }
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
