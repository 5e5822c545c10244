/*!
 * 配置系统模块
 *
 * The engine reads a nested key-value store (JSON on disk) once at start.
 * `ConfigStore` owns the raw tree with dotted-key access, `SyncSettings` is
 * the validated, typed view the engine actually runs with.
 */

pub mod defaults;
pub mod paths;
pub mod profile;
pub mod settings;
pub mod store;

pub use defaults::create_default_config;
pub use paths::ConfigPaths;
pub use profile::Profile;
pub use settings::{ConfigError, ConflictStrategy, SyncSettings};
pub use store::ConfigStore;

/// 配置文件名
pub const CONFIG_FILE_NAME: &str = "settings.json";

/// 应用目录名
pub const APP_DIR_NAME: &str = "wavesync";
