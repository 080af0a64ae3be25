//! Outgoing request augmentation
//!
//! The host's request pipeline holds an ordered list of header contributors.
//! The composition root registers [`UserAgentSuffix`] and, optionally,
//! [`IdentHeader`]; both read the same [`TokenProvider`], so the header is
//! always a suffix of the final user agent.

use std::sync::Arc;

/// User agent header name
pub const USER_AGENT: &str = "User-Agent";
/// Dedicated identification header
pub const IDENT_HEADER: &str = "X-Pkg-Ident";

/// Supplies the token string for outgoing requests
pub trait TokenProvider: Send + Sync {
    fn token_string(&self) -> String;
}

/// One step of header augmentation
pub trait HeaderContributor: Send + Sync {
    fn contribute(&self, headers: &mut RequestHeaders);
}

/// Ordered, case-insensitive header list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    entries: Vec<(String, String)>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set `name`, replacing any existing value
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Appends the token string to `User-Agent`
pub struct UserAgentSuffix {
    provider: Arc<dyn TokenProvider>,
}

impl UserAgentSuffix {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self { provider }
    }
}

impl HeaderContributor for UserAgentSuffix {
    fn contribute(&self, headers: &mut RequestHeaders) {
        let token = self.provider.token_string();
        if token.is_empty() {
            return;
        }
        let agent = match headers.get(USER_AGENT) {
            Some(base) if !base.is_empty() => format!("{} {}", base, token),
            _ => token,
        };
        headers.set(USER_AGENT, agent);
    }
}

/// Sets [`IDENT_HEADER`] to the token string
pub struct IdentHeader {
    provider: Arc<dyn TokenProvider>,
}

impl IdentHeader {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self { provider }
    }
}

impl HeaderContributor for IdentHeader {
    fn contribute(&self, headers: &mut RequestHeaders) {
        let token = self.provider.token_string();
        if !token.is_empty() {
            headers.set(IDENT_HEADER, token);
        }
    }
}

/// Header contributors applied over a base user agent
pub struct RequestPipeline {
    user_agent: String,
    contributors: Vec<Box<dyn HeaderContributor>>,
}

impl RequestPipeline {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            contributors: Vec::new(),
        }
    }

    pub fn with_contributor(mut self, contributor: impl HeaderContributor + 'static) -> Self {
        self.contributors.push(Box::new(contributor));
        self
    }

    /// User-agent suffix plus the identification header
    pub fn with_token_provider(self, provider: Arc<dyn TokenProvider>) -> Self {
        self.with_contributor(UserAgentSuffix::new(Arc::clone(&provider)))
            .with_contributor(IdentHeader::new(provider))
    }

    /// Headers for one outgoing request
    pub fn headers(&self) -> RequestHeaders {
        let mut headers = RequestHeaders::new();
        headers.set(USER_AGENT, self.user_agent.as_str());
        for contributor in &self.contributors {
            contributor.contribute(&mut headers);
        }
        headers
    }
}
