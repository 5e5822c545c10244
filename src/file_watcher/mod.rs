/*!
 * 文件变化监控
 *
 * Watches the working directory with `notify`, filters paths through
 * [`PathFilter`] and coalesces bursts of events into a single
 * [`ChangeBatch`] delivered through a one-slot mailbox.
 */

pub mod filter;
pub mod monitor;
pub mod types;

pub use filter::{PathFilter, DEFAULT_EXCLUDES};
pub use monitor::{FileMonitor, MonitorError};
pub use types::{ChangeBatch, MonitorStatus};
