//! Token string assembly
//!
//! Resolves each configured code to a value and joins the present values as
//! `code/value` parts after the version tag. The result is computed once and
//! reused until [`TokenAssembler::invalidate`] is called.

use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::debug;

use crate::context::IdentContext;
use crate::ident::hash_string;
use crate::pipeline::TokenProvider;
use crate::types::TokenCode;
use crate::APP_VERSION_STRING;

/// Code of the version part that leads every token string
pub const VERSION_CODE: &str = "ident";

/// Builds the token string for one [`IdentContext`]
#[derive(Debug)]
pub struct TokenAssembler {
    context: Arc<IdentContext>,
    cache: OnceCell<String>,
}

impl TokenAssembler {
    pub fn new(context: Arc<IdentContext>) -> Self {
        Self {
            context,
            cache: OnceCell::new(),
        }
    }

    pub fn context(&self) -> &Arc<IdentContext> {
        &self.context
    }

    /// The full token string, e.g. `ident/0.1.0 c/... s/... e/...`
    pub fn build_token_string(&self) -> &str {
        self.cache.get_or_init(|| {
            let token_type = self.context.token_type();
            let mut parts = vec![format!("{}/{}", VERSION_CODE, APP_VERSION_STRING)];
            for code in token_type.assembly_order() {
                match self.resolve_code(code) {
                    Some(value) if !value.is_empty() => parts.push(format!("{}/{}", code, value)),
                    _ => debug!("No value for token code {}", code),
                }
            }
            let result = parts.join(" ");
            debug!("Full client token: {}", result);
            result
        })
    }

    /// Drop the cached string; the next build recomputes it
    pub fn invalidate(&mut self) {
        self.cache.take();
    }

    /// Value for a single code, `None` when unavailable
    pub fn resolve_code(&self, code: TokenCode) -> Option<String> {
        let context = &self.context;
        let token_type = context.token_type();
        let pepper = token_type.pepper.as_deref();
        let host = context.host();
        match code {
            TokenCode::Client => Some(context.client_token().to_string()),
            TokenCode::Session => Some(context.session_token().to_string()),
            TokenCode::Environment => Some(context.environment_token()),
            TokenCode::Machine => Some(context.machine_token().to_string()),
            TokenCode::Username => host.username(),
            TokenCode::UsernameHash => host
                .username()
                .map(|name| hash_string("username", &name, pepper)),
            TokenCode::Hostname => host.hostname(),
            TokenCode::HostnameHash => host
                .hostname()
                .map(|name| hash_string("hostname", &name, pepper)),
            TokenCode::Organization => token_type.organization.clone(),
            TokenCode::EnvName => context.environment_name(),
            TokenCode::EnvNameHash => context
                .environment_name()
                .map(|name| hash_string("environment", &name, pepper)),
        }
    }
}

impl TokenProvider for TokenAssembler {
    fn token_string(&self) -> String {
        self.build_token_string().to_string()
    }
}
