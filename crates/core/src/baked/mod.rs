//! Install-time baked configuration
//!
//! - [`TokenTable`]: ordered URL-prefix to token map
//! - [`BakedTokenLoader`]: mtime-cached `repo_tokens` lookups
//! - [`BakedConfig`]: the file model edited by `pkgident configure`

pub mod config;
pub mod loader;
pub mod table;

pub use config::{compose_config_string, BakedConfig, ConfigChanges, HeartbeatSetting};
pub use loader::{BakedTokenLoader, CLOUD_REPO_ROOT};
pub use table::{normalize_url, TokenTable};
