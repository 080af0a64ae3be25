//! Error types for pkgident-core
//!
//! Only the configuration-writing paths surface these errors. The telemetry
//! path (identifiers, resolver, assembler, token lookups) degrades instead.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum IdentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("No {0} directory found")]
    NoPlatformDir(&'static str),

    #[error("Failed to update {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "A repo_token value may only be supplied if accompanied \
         by a channel_alias or default_channels value"
    )]
    RepoTokenWithoutChannel,

    #[error("Conflicting organization strings supplied: {config} vs {flag}")]
    ConflictingOrganization { config: String, flag: String },

    #[error("Conflicting pepper values supplied: config string already carries a pepper")]
    ConflictingPepper,

    #[error("Invalid value for {key}: expected {expected}")]
    InvalidConfigValue { key: String, expected: &'static str },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, IdentError>;
