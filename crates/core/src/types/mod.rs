//! Domain types for token configuration

mod code;
mod preset;

pub use code::{codes_to_string, TokenCode};
pub use preset::TokenFormatPreset;
