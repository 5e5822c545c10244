//! Checkpoint 系统模块
//!
//! 提供基于 commit 的检查点日志：
//! - 每次成功提交后追加 checkpoint
//! - 游标前后移动（revert / forward / goto）
//! - 历史浏览、搜索与导出

mod models;
mod storage;
mod store;

pub use models::{
    Checkpoint, CheckpointError, CheckpointResult, CheckpointTrigger, HistoryEntry,
    HistoryExport, NewCheckpoint, Position,
};
pub use storage::CheckpointStorage;
pub use store::{CheckpointStore, History, HistoryIter, DATABASE_FILE_NAME};
