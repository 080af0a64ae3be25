//! Host configuration integration
//!
//! The host client exposes its layered configuration through
//! [`ConfigSource`]. The core reads values together with the layer they came
//! from, and registers the keys it owns at start-up.

pub mod layered;
pub mod resolver;

pub use layered::LayeredConfig;
pub use resolver::{
    raw_config, redact_config, resolve_token_type, ConfigOrigin, RawConfig, ResolvedTokenType,
    CONFIG_ENV_VAR, DEFAULT_CONFIG,
};

use serde_yaml::Value;
use std::fmt;
use std::path::PathBuf;

/// Token configuration string key
pub const CONFIG_KEY: &str = "pkgident";
/// URL-prefix to auth-token map key
pub const REPO_TOKENS_KEY: &str = "repo_tokens";
/// Heartbeat flag key
pub const HEARTBEAT_KEY: &str = "pkgident_heartbeat";
// Host keys the baked file may also set
pub const DEFAULT_CHANNELS_KEY: &str = "default_channels";
pub const CHANNEL_ALIAS_KEY: &str = "channel_alias";
pub const ADD_REPO_TOKEN_KEY: &str = "add_repo_token";

/// Read/register access to the host's configuration
pub trait ConfigSource: Send + Sync {
    /// Value for `key` and the layer that supplied it
    fn get_config_value(&self, key: &str) -> Option<(ConfigValue, ConfigLocation)>;

    /// Declare a configuration key on the host's schema
    fn register_parameter(&mut self, spec: ParameterSpec);
}

/// A configuration value as seen by the core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Str(String),
    Bool(bool),
    List(Vec<String>),
    Map(Vec<(String, String)>),
}

impl ConfigValue {
    /// Convert a parsed YAML node; `None` for null
    pub fn from_yaml(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(ConfigValue::Bool(*b)),
            Value::Number(_) | Value::String(_) => scalar_to_string(value).map(ConfigValue::Str),
            Value::Sequence(items) => Some(ConfigValue::List(
                items.iter().filter_map(scalar_to_string).collect(),
            )),
            Value::Mapping(map) => Some(ConfigValue::Map(
                map.iter()
                    .filter_map(|(k, v)| Some((scalar_to_string(k)?, scalar_to_string(v)?)))
                    .collect(),
            )),
            Value::Tagged(tagged) => Self::from_yaml(&tagged.value),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean reading; strings `yes`, `true`, `t`, `1` count as true
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::Str(s) => Some(truthy(s)),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ConfigValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(String, String)]> {
        match self {
            ConfigValue::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

/// Case-insensitive `yes` / `true` / `t` / `1`
pub fn truthy(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "yes" | "true" | "t" | "1"
    )
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Configuration layer a value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Install-time file that user configuration cannot override
    Baked(PathBuf),
    /// Ordinary configuration file
    File(PathBuf),
    /// Registered default; no layer set the key
    Default,
}

impl ConfigLocation {
    pub fn is_baked(&self) -> bool {
        matches!(self, ConfigLocation::Baked(_))
    }
}

impl fmt::Display for ConfigLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigLocation::Baked(path) => write!(f, "{} (baked)", path.display()),
            ConfigLocation::File(path) => write!(f, "{}", path.display()),
            ConfigLocation::Default => write!(f, "<default>"),
        }
    }
}

/// Value shape a registered key accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    String,
    /// Booleans, or strings read with [`truthy`]
    Bool,
    List,
    Map,
}

impl ParameterKind {
    pub fn accepts(self, value: &ConfigValue) -> bool {
        matches!(
            (self, value),
            (ParameterKind::String, ConfigValue::Str(_))
                | (ParameterKind::Bool, ConfigValue::Bool(_))
                | (ParameterKind::Bool, ConfigValue::Str(_))
                | (ParameterKind::List, ConfigValue::List(_))
                | (ParameterKind::Map, ConfigValue::Map(_))
        )
    }
}

/// Declaration of a configuration key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    /// `None` leaves the key unset when no layer has it
    pub default: Option<ConfigValue>,
}

impl ParameterSpec {
    pub fn string(name: &str, default: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParameterKind::String,
            default: Some(ConfigValue::Str(default.to_string())),
        }
    }

    pub fn boolean(name: &str, default: bool) -> Self {
        Self {
            name: name.to_string(),
            kind: ParameterKind::Bool,
            default: Some(ConfigValue::Bool(default)),
        }
    }

    pub fn map(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParameterKind::Map,
            default: Some(ConfigValue::Map(Vec::new())),
        }
    }

    /// Key with no default value
    pub fn optional(name: &str, kind: ParameterKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            default: None,
        }
    }
}

/// The keys this crate adds to the host configuration, plus the host keys
/// it reads
///
/// The heartbeat is a `Bool` key, so a URL string passes through as-is; read
/// it with `HeartbeatSetting::from_config_value`.
pub fn ident_parameters() -> Vec<ParameterSpec> {
    vec![
        ParameterSpec::string(CONFIG_KEY, DEFAULT_CONFIG),
        ParameterSpec::map(REPO_TOKENS_KEY),
        ParameterSpec::boolean(HEARTBEAT_KEY, false),
        ParameterSpec::optional(DEFAULT_CHANNELS_KEY, ParameterKind::List),
        ParameterSpec::optional(CHANNEL_ALIAS_KEY, ParameterKind::String),
        ParameterSpec::optional(ADD_REPO_TOKEN_KEY, ParameterKind::Bool),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_scalars() {
        let v: Value = serde_yaml::from_str("full:org").unwrap();
        assert_eq!(ConfigValue::from_yaml(&v), Some(ConfigValue::Str("full:org".into())));

        let v: Value = serde_yaml::from_str("true").unwrap();
        assert_eq!(ConfigValue::from_yaml(&v), Some(ConfigValue::Bool(true)));

        let v: Value = serde_yaml::from_str("42").unwrap();
        assert_eq!(ConfigValue::from_yaml(&v), Some(ConfigValue::Str("42".into())));

        let v: Value = serde_yaml::from_str("~").unwrap();
        assert_eq!(ConfigValue::from_yaml(&v), None);
    }

    #[test]
    fn test_from_yaml_map_keeps_order() {
        let v: Value = serde_yaml::from_str("z: 1\na: 2\nm: 3\n").unwrap();
        let value = ConfigValue::from_yaml(&v).unwrap();
        let keys: Vec<&str> = value.as_map().unwrap().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn test_truthy_strings() {
        for s in ["yes", "TRUE", "t", "1", " True "] {
            assert!(truthy(s), "{}", s);
        }
        for s in ["no", "false", "0", "", "https://repo.example/"] {
            assert!(!truthy(s), "{}", s);
        }
    }

    #[test]
    fn test_parameter_kind_accepts() {
        assert!(ParameterKind::Bool.accepts(&ConfigValue::Str("yes".into())));
        assert!(ParameterKind::Bool.accepts(&ConfigValue::Bool(false)));
        assert!(!ParameterKind::String.accepts(&ConfigValue::Bool(true)));
        assert!(!ParameterKind::Map.accepts(&ConfigValue::List(vec![])));
    }

    #[test]
    fn test_ident_parameters_registered_defaults() {
        let params = ident_parameters();
        let config = params.iter().find(|p| p.name == CONFIG_KEY).unwrap();
        assert_eq!(config.default, Some(ConfigValue::Str("default".into())));
        for key in [
            REPO_TOKENS_KEY,
            HEARTBEAT_KEY,
            DEFAULT_CHANNELS_KEY,
            CHANNEL_ALIAS_KEY,
            ADD_REPO_TOKEN_KEY,
        ] {
            assert!(params.iter().any(|p| p.name == key), "{}", key);
        }
        let alias = params.iter().find(|p| p.name == CHANNEL_ALIAS_KEY).unwrap();
        assert_eq!(alias.default, None);
    }

    #[test]
    fn test_location_display() {
        assert_eq!(ConfigLocation::Default.to_string(), "<default>");
        assert!(ConfigLocation::Baked(PathBuf::from("/x/etc/pkgident.yml"))
            .to_string()
            .ends_with("(baked)"));
    }
}
