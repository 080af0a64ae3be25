//! Host values: username, hostname and environment name

use std::path::Path;
use tracing::debug;

/// Source of per-host values for the `u`, `h` and their hashed codes
///
/// A missing value only drops its own token part.
pub trait HostValues: Send + Sync {
    /// Current OS user
    fn username(&self) -> Option<String>;

    /// Current host name
    fn hostname(&self) -> Option<String>;
}

/// Host values queried from the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl HostValues for SystemHost {
    fn username(&self) -> Option<String> {
        match whoami::fallible::username() {
            Ok(name) if !name.is_empty() => Some(name),
            Ok(_) => {
                debug!("Username query returned an empty value");
                None
            }
            Err(e) => {
                debug!("Username query raised an error: {}", e);
                None
            }
        }
    }

    fn hostname(&self) -> Option<String> {
        let value = match hostname::get() {
            Ok(value) => value,
            Err(e) => {
                debug!("Hostname query raised an error: {}", e);
                return None;
            }
        };
        match value.into_string() {
            Ok(name) if !name.is_empty() => Some(name),
            Ok(_) => {
                debug!("Hostname query returned an empty value");
                None
            }
            Err(_) => {
                debug!("Hostname is not valid UTF-8");
                None
            }
        }
    }
}

/// Name of the environment at `env_prefix`
///
/// The install prefix itself is the `base` environment; any other
/// environment is named by its directory.
pub fn environment_name(env_prefix: &Path, install_prefix: &Path) -> Option<String> {
    if env_prefix == install_prefix {
        return Some("base".to_string());
    }
    let name = env_prefix
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string);
    if name.is_none() {
        debug!("No environment name for {}", env_prefix.display());
    }
    name
}
