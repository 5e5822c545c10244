/*!
 * 配置系统路径管理模块
 */

use crate::utils::error::AppResult;
use anyhow::{anyhow, Context};
use std::path::{Path, PathBuf};

/// 配置路径管理器
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    config_dir: PathBuf,
}

impl ConfigPaths {
    /// 根据当前平台确定配置目录
    ///
    /// - Windows: `%APPDATA%\wavesync`
    /// - macOS: `~/Library/Application Support/wavesync`
    /// - Linux: `~/.config/wavesync`
    pub fn new() -> AppResult<Self> {
        let base = dirs::config_dir().ok_or_else(|| anyhow!("Unable to determine config directory"))?;
        Ok(Self {
            config_dir: base.join(crate::config::APP_DIR_NAME),
        })
    }

    pub fn with_config_dir<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// 获取主配置文件路径
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(crate::config::CONFIG_FILE_NAME)
    }

    pub async fn ensure_config_dir(&self) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.config_dir)
            .await
            .with_context(|| format!("Failed to create config dir: {}", self.config_dir.display()))
    }
}
