//! Checkpoint 数据模型定义

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::git::CommitRef;

/// Checkpoint 相关错误
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("checkpoint io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("checkpoint {0} does not exist")]
    NotFound(i64),

    #[error("cannot move {requested} step(s), only {available} available")]
    OutOfRange { requested: usize, available: usize },
}

pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// 毫秒时间戳转 DateTime
pub fn timestamp_to_datetime(ts_millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts_millis).unwrap_or_default()
}

/// Why a checkpoint was recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointTrigger {
    Manual,
    Auto,
    PreRevert,
    PostRevert,
}

impl CheckpointTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
            Self::PreRevert => "pre-revert",
            Self::PostRevert => "post-revert",
        }
    }

    /// Navigation bookkeeping entries are logged without moving the cursor.
    pub fn moves_cursor(&self) -> bool {
        matches!(self, Self::Manual | Self::Auto)
    }
}

impl fmt::Display for CheckpointTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointTrigger {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            "pre-revert" => Ok(Self::PreRevert),
            "post-revert" => Ok(Self::PostRevert),
            other => Err(CheckpointError::Parse(format!(
                "Unknown checkpoint trigger: {}",
                other
            ))),
        }
    }
}

/// Named reference to a commit, immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: i64,
    pub commit_ref: CommitRef,
    pub description: String,
    pub trigger: CheckpointTrigger,
    /// Subject line of the referenced commit.
    pub commit_summary: String,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn matches(&self, needle_lowercase: &str) -> bool {
        self.description.to_lowercase().contains(needle_lowercase)
            || self.commit_summary.to_lowercase().contains(needle_lowercase)
    }
}

/// 新建 Checkpoint 的输入参数
#[derive(Debug, Clone)]
pub struct NewCheckpoint {
    pub commit_ref: CommitRef,
    pub description: String,
    pub trigger: CheckpointTrigger,
    pub commit_summary: String,
}

/// Where the cursor sits and how far it can move.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Index into the log, `None` while the log is empty.
    pub cursor: Option<usize>,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_id: Option<i64>,
    pub steps_back: usize,
    pub steps_forward: usize,
}

impl Position {
    pub fn can_revert(&self) -> bool {
        self.steps_back > 0
    }

    pub fn can_forward(&self) -> bool {
        self.steps_forward > 0
    }
}

/// One row of a history listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub checkpoint: Checkpoint,
    pub index: usize,
    pub is_current: bool,
    /// Signed distance from the cursor: negative is older, positive newer.
    pub relative_position: i64,
}

/// JSON document written by `export`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryExport {
    pub exported_at: DateTime<Utc>,
    pub cursor: Option<usize>,
    pub checkpoints: Vec<Checkpoint>,
}
