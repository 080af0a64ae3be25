//! Per-process session identifier

use once_cell::sync::OnceCell;
use tracing::debug;

use super::stable::random_token;

/// Session identifier length
pub const SESSION_TOKEN_LEN: usize = 8;

/// Session identifier, generated on first use and never persisted
///
/// The composition root owns one instance per process run, so every token
/// string built during that run carries the same `s/` value.
#[derive(Debug, Default)]
pub struct SessionIdentifier {
    value: OnceCell<String>,
}

impl SessionIdentifier {
    /// Create an identifier that has not been generated yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the session identifier, generating it on the first call
    pub fn get(&self) -> &str {
        self.value.get_or_init(|| {
            let token = random_token(SESSION_TOKEN_LEN);
            debug!("Session token generated: {}", token);
            token
        })
    }
}
