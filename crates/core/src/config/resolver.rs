//! Token configuration resolution
//!
//! A configuration string has the form `preset_or_codes[:organization[:pepper]]`.
//! Resolution expands presets, applies the organization rule, filters and
//! deduplicates codes, and decodes the pepper. Malformed pieces are dropped
//! with a debug note; resolution itself never fails.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::fmt;
use tracing::debug;

use super::{ConfigLocation, ConfigSource, ConfigValue, CONFIG_KEY};
use crate::ident::decode_pepper;
use crate::types::{codes_to_string, TokenCode, TokenFormatPreset};

/// Process environment override for the configuration string
pub const CONFIG_ENV_VAR: &str = "PKGIDENT_CONFIG";

/// Configuration used when nothing else is set
pub const DEFAULT_CONFIG: &str = "default";

/// Normalized token configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTokenType {
    /// Known codes, deduplicated, in first-occurrence order
    pub codes: Vec<TokenCode>,
    /// Non-empty organization string; present exactly when `o` is in `codes`
    pub organization: Option<String>,
    /// Decoded pepper for the hashed variants
    pub pepper: Option<Vec<u8>>,
}

impl ResolvedTokenType {
    pub fn contains(&self, code: TokenCode) -> bool {
        self.codes.contains(&code)
    }

    /// Code letters in resolution order
    pub fn codes_string(&self) -> String {
        codes_to_string(&self.codes)
    }

    /// Codes in canonical assembly order
    pub fn assembly_order(&self) -> Vec<TokenCode> {
        let mut codes = self.codes.clone();
        codes.sort();
        codes
    }

    /// Render back to a configuration string that resolves to `self`
    pub fn config_string(&self) -> String {
        let mut codes = self.codes_string();
        if codes.is_empty() {
            // An empty format name means "default"
            codes = TokenFormatPreset::None.name().to_string();
        }
        let org = self.organization.as_deref().unwrap_or_default();
        match &self.pepper {
            Some(pepper) => format!("{}:{}:{}", codes, org, URL_SAFE_NO_PAD.encode(pepper)),
            None if !org.is_empty() => format!("{}:{}", codes, org),
            None => codes,
        }
    }
}

/// Resolve a raw configuration string into codes, organization and pepper
///
/// # Example
/// ```
/// # use pkgident_core::config::resolve_token_type;
/// let resolved = resolve_token_type("full:research-team");
/// assert_eq!(resolved.codes_string(), "cseuhno");
/// assert_eq!(resolved.organization.as_deref(), Some("research-team"));
/// ```
pub fn resolve_token_type(raw: &str) -> ResolvedTokenType {
    debug!("Token config: {}", redact_config(raw));

    let (format, rest) = match raw.split_once(':') {
        Some((format, rest)) => (format, Some(rest)),
        None => (raw, None),
    };
    let (organization, pepper_text) = match rest {
        Some(rest) => match rest.split_once(':') {
            Some((org, pepper)) => (org, Some(pepper)),
            None => (rest, None),
        },
        None => ("", None),
    };

    let format = if format.is_empty() { DEFAULT_CONFIG } else { format };
    let expanded = match TokenFormatPreset::from_name(format) {
        Some(preset) => preset.codes(),
        None => format,
    };
    debug!("Preliminary usage tokens: {}", expanded);

    let mut codes: Vec<TokenCode> = Vec::new();
    for c in expanded.chars() {
        match TokenCode::from_char(c) {
            Some(code) if !codes.contains(&code) => codes.push(code),
            Some(_) => {}
            None => debug!("Ignoring unrecognized token code: {:?}", c),
        }
    }

    let has_org_code = codes.contains(&TokenCode::Organization);
    if !organization.is_empty() && !has_org_code {
        debug!("Organization string provided; adding o to format");
        codes.push(TokenCode::Organization);
    } else if organization.is_empty() && has_org_code {
        debug!("Expected an organization string; none provided");
        codes.retain(|c| *c != TokenCode::Organization);
    }

    let pepper = pepper_text.and_then(decode_pepper);
    if pepper_text.is_some_and(|p| !p.is_empty()) && pepper.is_none() {
        debug!("Pepper could not be decoded; hashing without it");
    }

    let resolved = ResolvedTokenType {
        codes,
        organization: (!organization.is_empty()).then(|| organization.to_string()),
        pepper,
    };
    debug!(
        "Final token config: {} {}",
        resolved.codes_string(),
        resolved.organization.as_deref().unwrap_or_default()
    );
    resolved
}

/// Hide the pepper component of a configuration string for logging
pub fn redact_config(raw: &str) -> String {
    if raw.matches(':').count() > 1 {
        if let Some((head, _)) = raw.rsplit_once(':') {
            return format!("{}:<pepper>", head);
        }
    }
    raw.to_string()
}

/// Where the raw configuration string came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// Explicit per-call override
    Override,
    /// [`CONFIG_ENV_VAR`]
    Environment,
    /// Host configuration layer
    Config(ConfigLocation),
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigOrigin::Override => write!(f, "override"),
            ConfigOrigin::Environment => write!(f, "${}", CONFIG_ENV_VAR),
            ConfigOrigin::Config(location) => write!(f, "{}", location),
        }
    }
}

/// Raw configuration string plus its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConfig {
    pub value: String,
    pub origin: ConfigOrigin,
}

/// Pick the raw configuration string by precedence
///
/// Explicit override, then the environment value, then the host
/// configuration (baked layer first), then [`DEFAULT_CONFIG`]. Empty
/// override and environment values count as unset.
pub fn raw_config(
    override_value: Option<&str>,
    env_value: Option<&str>,
    source: &dyn ConfigSource,
) -> RawConfig {
    if let Some(value) = override_value.filter(|v| !v.is_empty()) {
        debug!("Token config from override: {}", redact_config(value));
        return RawConfig {
            value: value.to_string(),
            origin: ConfigOrigin::Override,
        };
    }
    if let Some(value) = env_value.filter(|v| !v.is_empty()) {
        debug!("Token config from ${}: {}", CONFIG_ENV_VAR, redact_config(value));
        return RawConfig {
            value: value.to_string(),
            origin: ConfigOrigin::Environment,
        };
    }
    match source.get_config_value(CONFIG_KEY) {
        Some((ConfigValue::Str(value), location)) => {
            match &location {
                ConfigLocation::Baked(_) => {
                    debug!("Hardcoded token config: {}", redact_config(&value))
                }
                ConfigLocation::Default => debug!("Selecting default token config"),
                ConfigLocation::File(_) => {
                    debug!("Token config from {}: {}", location, redact_config(&value))
                }
            }
            RawConfig {
                value,
                origin: ConfigOrigin::Config(location),
            }
        }
        Some((other, location)) => {
            debug!("Ignoring non-string token config {:?} from {}", other, location);
            default_raw_config()
        }
        None => {
            debug!("Selecting default token config");
            default_raw_config()
        }
    }
}

fn default_raw_config() -> RawConfig {
    RawConfig {
        value: DEFAULT_CONFIG.to_string(),
        origin: ConfigOrigin::Config(ConfigLocation::Default),
    }
}
