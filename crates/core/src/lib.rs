//! pkgident Core - Anonymous telemetry tokens for a package-manager client
//!
//! This crate provides:
//! - Stable, session and hashed identifiers
//! - Token configuration resolution (`preset_or_codes[:org[:pepper]]`)
//! - Token string assembly for the user agent and `X-Pkg-Ident` header
//! - Baked install-time configuration and repository tokens
//! - Error types

// Version constants
pub const APP_VERSION_STRING: &str = env!("CARGO_PKG_VERSION");

pub mod assembler;
pub mod auth;
pub mod baked;
pub mod config;
pub mod context;
pub mod error;
pub mod ident;
pub mod pipeline;
pub mod types;

// Re-export common types
pub use assembler::TokenAssembler;
pub use auth::{ChainedLookup, RepoTokenStore, TokenLookup};
pub use baked::{BakedConfig, BakedTokenLoader, ConfigChanges, TokenTable};
pub use config::{resolve_token_type, ConfigSource, LayeredConfig, ResolvedTokenType};
pub use context::{IdentContext, IdentSettings};
pub use error::{IdentError, Result};
pub use pipeline::{RequestPipeline, TokenProvider, IDENT_HEADER};
pub use types::{TokenCode, TokenFormatPreset};
