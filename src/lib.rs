//! wavesync 同步引擎
//!
//! 保持本地工作目录与远程 git 仓库双向一致，并在仓库历史之上提供
//! 基于 checkpoint 的撤销/重做。
//! 主要功能包括：
//! - 文件变化监控与防抖
//! - 定时拉取、提交与推送
//! - 冲突检测与暂停
//! - checkpoint 日志导航

pub mod checkpoint; // checkpoint 日志与游标
pub mod config; // 配置系统模块
pub mod file_watcher; // 文件变化监控
pub mod git; // 远程仓库适配层
pub mod sync; // 同步协调器
pub mod utils; // 工具和错误处理模块

pub use sync::{EngineState, EngineStatus, SyncEngine, SyncError};
