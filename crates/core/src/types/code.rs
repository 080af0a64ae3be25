//! Token codes: the single-letter field kinds of the token string

use std::fmt;

/// One kind of value that can appear in the token string
///
/// Declaration order is the canonical assembly order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenCode {
    /// `c` - persisted per-user client identifier
    Client,
    /// `s` - per-process session identifier
    Session,
    /// `e` - hash of the client identifier and environment path
    Environment,
    /// `m` - persisted machine-wide identifier
    Machine,
    /// `u` - plain username
    Username,
    /// `U` - peppered username hash
    UsernameHash,
    /// `h` - plain hostname
    Hostname,
    /// `H` - peppered hostname hash
    HostnameHash,
    /// `o` - organization string from the configuration
    Organization,
    /// `n` - plain environment name
    EnvName,
    /// `N` - peppered environment name hash
    EnvNameHash,
}

impl TokenCode {
    /// Every known code, in canonical order
    pub const ALL: [TokenCode; 11] = [
        TokenCode::Client,
        TokenCode::Session,
        TokenCode::Environment,
        TokenCode::Machine,
        TokenCode::Username,
        TokenCode::UsernameHash,
        TokenCode::Hostname,
        TokenCode::HostnameHash,
        TokenCode::Organization,
        TokenCode::EnvName,
        TokenCode::EnvNameHash,
    ];

    /// Parse a code letter; `None` for anything outside the alphabet
    pub fn from_char(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_char() == c)
    }

    /// The letter used in configuration and token strings
    pub fn as_char(self) -> char {
        match self {
            TokenCode::Client => 'c',
            TokenCode::Session => 's',
            TokenCode::Environment => 'e',
            TokenCode::Machine => 'm',
            TokenCode::Username => 'u',
            TokenCode::UsernameHash => 'U',
            TokenCode::Hostname => 'h',
            TokenCode::HostnameHash => 'H',
            TokenCode::Organization => 'o',
            TokenCode::EnvName => 'n',
            TokenCode::EnvNameHash => 'N',
        }
    }

    /// True for the peppered-hash variants `U`, `H`, `N`
    pub fn is_hashed(self) -> bool {
        matches!(
            self,
            TokenCode::UsernameHash | TokenCode::HostnameHash | TokenCode::EnvNameHash
        )
    }
}

impl fmt::Display for TokenCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Render codes as their letters
pub fn codes_to_string(codes: &[TokenCode]) -> String {
    codes.iter().map(|c| c.as_char()).collect()
}
