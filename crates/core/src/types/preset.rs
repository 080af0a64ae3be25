//! Named token format presets

/// Named shorthand for an ordered set of token codes
///
/// Every preset except `none` starts with the base identifiers `cse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFormatPreset {
    None,
    Default,
    Username,
    Hostname,
    Environment,
    UserEnv,
    UserHost,
    HostEnv,
    Full,
    FullHash,
    Machine,
}

impl TokenFormatPreset {
    pub const ALL: [TokenFormatPreset; 11] = [
        TokenFormatPreset::None,
        TokenFormatPreset::Default,
        TokenFormatPreset::Username,
        TokenFormatPreset::Hostname,
        TokenFormatPreset::Environment,
        TokenFormatPreset::UserEnv,
        TokenFormatPreset::UserHost,
        TokenFormatPreset::HostEnv,
        TokenFormatPreset::Full,
        TokenFormatPreset::FullHash,
        TokenFormatPreset::Machine,
    ];

    /// Look up a preset by its configuration name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            TokenFormatPreset::None => "none",
            TokenFormatPreset::Default => "default",
            TokenFormatPreset::Username => "username",
            TokenFormatPreset::Hostname => "hostname",
            TokenFormatPreset::Environment => "environment",
            TokenFormatPreset::UserEnv => "userenv",
            TokenFormatPreset::UserHost => "userhost",
            TokenFormatPreset::HostEnv => "hostenv",
            TokenFormatPreset::Full => "full",
            TokenFormatPreset::FullHash => "fullhash",
            TokenFormatPreset::Machine => "machine",
        }
    }

    /// Code letters the preset expands to
    pub fn codes(self) -> &'static str {
        match self {
            TokenFormatPreset::None => "",
            TokenFormatPreset::Default => "cse",
            TokenFormatPreset::Username => "cseu",
            TokenFormatPreset::Hostname => "cseh",
            TokenFormatPreset::Environment => "csen",
            TokenFormatPreset::UserEnv => "cseun",
            TokenFormatPreset::UserHost => "cseuh",
            TokenFormatPreset::HostEnv => "csehn",
            TokenFormatPreset::Full => "cseuhn",
            TokenFormatPreset::FullHash => "cseUHN",
            TokenFormatPreset::Machine => "csem",
        }
    }
}
