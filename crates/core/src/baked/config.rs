//! Baked configuration file model and editing
//!
//! The baked file lives at `<install-prefix>/etc/pkgident.yml` and is written
//! by the `pkgident configure` command. Keys this crate does not manage are
//! carried through unchanged.

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

use super::table::{normalize_url, TokenTable};
use crate::config::{
    truthy, ConfigValue, ADD_REPO_TOKEN_KEY, CHANNEL_ALIAS_KEY, CONFIG_KEY, DEFAULT_CHANNELS_KEY,
    DEFAULT_CONFIG, HEARTBEAT_KEY, REPO_TOKENS_KEY,
};
use crate::error::{IdentError, Result};
use crate::ident::generate_pepper;

/// Heartbeat flag as stored in the baked file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(into = "RawHeartbeat")]
pub enum HeartbeatSetting {
    #[default]
    Disabled,
    Enabled,
    /// Enabled against an explicit URL
    Url(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum RawHeartbeat {
    Flag(bool),
    Text(String),
}

impl From<HeartbeatSetting> for RawHeartbeat {
    fn from(setting: HeartbeatSetting) -> Self {
        match setting {
            HeartbeatSetting::Disabled => RawHeartbeat::Flag(false),
            HeartbeatSetting::Enabled => RawHeartbeat::Flag(true),
            HeartbeatSetting::Url(url) => RawHeartbeat::Text(url),
        }
    }
}

impl HeartbeatSetting {
    /// Read a string value: a URL, or a `yes`/`true`/`t`/`1` flag
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.contains("://") {
            HeartbeatSetting::Url(text.to_string())
        } else if truthy(text) {
            HeartbeatSetting::Enabled
        } else {
            HeartbeatSetting::Disabled
        }
    }

    /// Read a YAML node; numbers other than zero enable
    pub fn from_yaml(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(HeartbeatSetting::Disabled),
            Value::Bool(true) => Some(HeartbeatSetting::Enabled),
            Value::Bool(false) => Some(HeartbeatSetting::Disabled),
            Value::Number(n) if n.as_f64() == Some(0.0) => Some(HeartbeatSetting::Disabled),
            Value::Number(_) => Some(HeartbeatSetting::Enabled),
            Value::String(text) => Some(Self::parse(text)),
            _ => None,
        }
    }

    /// Read a value from the host configuration
    pub fn from_config_value(value: &ConfigValue) -> Self {
        match value {
            ConfigValue::Bool(true) => HeartbeatSetting::Enabled,
            ConfigValue::Str(text) => Self::parse(text),
            _ => HeartbeatSetting::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.is_disabled()
    }

    pub fn is_disabled(&self) -> bool {
        *self == HeartbeatSetting::Disabled
    }
}

/// Contents of the baked configuration file
///
/// Reading is per key: a key holding the wrong kind of value is logged and
/// dropped, and the rest of the file still loads.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BakedConfig {
    /// Token configuration string
    #[serde(rename = "pkgident", skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_channels: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_alias: Option<String>,

    #[serde(skip_serializing_if = "TokenTable::is_empty")]
    pub repo_tokens: TokenTable,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_repo_token: Option<bool>,

    #[serde(rename = "pkgident_heartbeat", skip_serializing_if = "HeartbeatSetting::is_disabled")]
    pub heartbeat: HeartbeatSetting,

    /// Keys managed by someone else
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl BakedConfig {
    /// Load the file at `path`; `Ok(None)` when it does not exist
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Self::parse(&text).map(Some)
    }

    /// Parse YAML text; an empty document is an empty config
    ///
    /// Fails only when the text is not YAML or the document is not a mapping.
    pub fn parse(text: &str) -> Result<Self> {
        match serde_yaml::from_str::<Value>(text)? {
            Value::Null => Ok(Self::default()),
            Value::Mapping(map) => Ok(Self::from_mapping(map)),
            _ => Err(IdentError::InvalidConfigValue {
                key: "<document>".to_string(),
                expected: "a mapping",
            }),
        }
    }

    fn from_mapping(mut map: Mapping) -> Self {
        let config = take(&mut map, CONFIG_KEY, "a string", scalar_string);
        let default_channels = take(&mut map, DEFAULT_CHANNELS_KEY, "a list of strings", |v| match v {
            Value::Sequence(items) => items.iter().map(scalar_string).collect::<Option<Vec<_>>>(),
            Value::String(channel) => Some(vec![channel.clone()]),
            _ => None,
        });
        let channel_alias = take(&mut map, CHANNEL_ALIAS_KEY, "a string", |v| {
            v.as_str().map(str::to_string)
        });
        let repo_tokens = take(&mut map, REPO_TOKENS_KEY, "a map of strings", TokenTable::from_yaml);
        let add_repo_token = take(&mut map, ADD_REPO_TOKEN_KEY, "a boolean", |v| match v {
            Value::Bool(b) => Some(*b),
            Value::String(text) => Some(truthy(text)),
            _ => None,
        });
        let heartbeat = take(&mut map, HEARTBEAT_KEY, "a boolean or URL", HeartbeatSetting::from_yaml);

        let other = map
            .into_iter()
            .filter_map(|(key, value)| match key {
                Value::String(key) => Some((key, value)),
                key => {
                    debug!("Ignoring non-string baked key {:?}", key);
                    None
                }
            })
            .collect();

        Self {
            config,
            default_channels,
            channel_alias,
            repo_tokens: repo_tokens.unwrap_or_default(),
            add_repo_token,
            heartbeat: heartbeat.unwrap_or_default(),
            other,
        }
    }

    /// True when writing would produce an empty file
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Write to `path`, or remove `path` when the config is empty
    ///
    /// An existing file is moved to `<path>.orig` while writing and restored
    /// if the write fails.
    pub fn write(&self, path: &Path) -> Result<()> {
        if self.is_empty() {
            return match fs::remove_file(path) {
                Ok(()) => {
                    info!("Removed {}", path.display());
                    Ok(())
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(source) => Err(IdentError::ConfigWrite {
                    path: path.to_path_buf(),
                    source,
                }),
            };
        }

        let text = serde_yaml::to_string(self)?;
        replace_with_backup(path, &text, |path, text| fs::write(path, text))
    }

    /// Apply `changes`, returning whether anything changed
    ///
    /// On error the config is left untouched.
    pub fn apply(&mut self, changes: &ConfigChanges) -> Result<bool> {
        let mut next = self.clone();

        if let Some(config) = &changes.config {
            let config = config.trim();
            next.config = (!config.is_empty() && config != DEFAULT_CONFIG).then(|| config.to_string());
        }

        if let Some(entries) = changes.default_channels.as_deref().filter(|e| !e.is_empty()) {
            let channels = split_channels(entries);
            next.default_channels = (!channels.is_empty()).then_some(channels);
        }

        if let Some(alias) = &changes.channel_alias {
            let alias = alias.trim().trim_end_matches('/');
            next.channel_alias = (!alias.is_empty()).then(|| alias.to_string());
        }

        if let Some(token) = &changes.repo_token {
            let mut tokens = TokenTable::new();
            let token = token.trim();
            if !token.is_empty() {
                let anchor = next.token_anchor().ok_or(IdentError::RepoTokenWithoutChannel)?;
                tokens.insert(anchor, token);
            }
            next.repo_tokens = tokens;
        }

        if let Some(enabled) = changes.heartbeat {
            next.heartbeat = if enabled {
                HeartbeatSetting::Enabled
            } else {
                HeartbeatSetting::Disabled
            };
        }

        next.add_repo_token = (!next.repo_tokens.is_empty()).then_some(true);

        let changed = next != *self;
        *self = next;
        Ok(changed)
    }

    /// `scheme://host/` of the first channel URL able to carry a repo token
    ///
    /// Default channels are tried before the channel alias.
    pub fn token_anchor(&self) -> Option<String> {
        self.default_channels
            .iter()
            .flatten()
            .chain(self.channel_alias.iter())
            .find(|c| c.contains('/'))
            .map(|c| anchor_of(c))
    }
}

/// Remove `key` and read it with `read`; a null value counts as unset
fn take<T>(
    map: &mut Mapping,
    key: &str,
    expected: &'static str,
    read: impl FnOnce(&Value) -> Option<T>,
) -> Option<T> {
    let value = map.remove(key)?;
    if value.is_null() {
        return None;
    }
    let parsed = read(&value);
    if parsed.is_none() {
        let err = IdentError::InvalidConfigValue {
            key: key.to_string(),
            expected,
        };
        debug!("Ignoring baked {:?}: {}", value, err);
    }
    parsed
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Replace `path` with `text`, holding the old file at `<path>.orig` until
/// the new one is written
fn replace_with_backup(
    path: &Path,
    text: &str,
    write: impl FnOnce(&Path, &str) -> io::Result<()>,
) -> Result<()> {
    let write_err = |source: io::Error| IdentError::ConfigWrite {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let backup = backup_path(path);
    let renamed = path.exists() && fs::rename(path, &backup).is_ok();
    match write(path, text) {
        Ok(()) => {
            if renamed {
                if let Err(e) = fs::remove_file(&backup) {
                    debug!("Unable to remove {}: {}", backup.display(), e);
                }
            }
            info!("Wrote {}", path.display());
            Ok(())
        }
        Err(source) => {
            if renamed {
                if let Err(e) = fs::rename(&backup, path) {
                    debug!("Unable to restore {}: {}", path.display(), e);
                }
            }
            Err(write_err(source))
        }
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".orig");
    PathBuf::from(name)
}

/// Split comma-separated entries, trimming and dropping trailing `/`
fn split_channels(entries: &[String]) -> Vec<String> {
    let mut channels: Vec<String> = Vec::new();
    for entry in entries {
        for channel in entry.split(',') {
            let channel = channel.trim().trim_end_matches('/');
            if !channel.is_empty() && !channels.iter().any(|c| c == channel) {
                channels.push(channel.to_string());
            }
        }
    }
    channels
}

fn anchor_of(channel: &str) -> String {
    let channel = channel.trim();
    match Url::parse(channel) {
        Ok(url) if url.has_host() => {
            let host = url.host_str().unwrap_or_default();
            match url.port() {
                Some(port) => format!("{}://{}:{}/", url.scheme(), host, port),
                None => format!("{}://{}/", url.scheme(), host),
            }
        }
        _ => {
            let head: Vec<&str> = channel.splitn(4, '/').take(3).collect();
            normalize_url(&head.join("/"))
        }
    }
}

/// Fields to change in the baked file; `None` leaves a field alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigChanges {
    /// Token configuration string; empty or `default` clears it
    pub config: Option<String>,
    /// Channel URLs, each possibly comma-separated; an all-empty list clears
    pub default_channels: Option<Vec<String>>,
    /// Empty clears
    pub channel_alias: Option<String>,
    /// Empty clears every stored repo token
    pub repo_token: Option<String>,
    pub heartbeat: Option<bool>,
}

impl ConfigChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Merge a separate organization and an optional fresh pepper into `config`
///
/// An empty format name becomes `default`. Fails when `org_token` disagrees
/// with an organization already in `config`, or when a pepper is requested
/// but `config` already carries one.
///
/// # Example
/// ```
/// # use pkgident_core::baked::compose_config_string;
/// assert_eq!(compose_config_string("full", Some("acme"), false).unwrap(), "full:acme");
/// assert_eq!(compose_config_string(":acme", None, false).unwrap(), "default:acme");
/// assert!(compose_config_string("full:acme", Some("other"), false).is_err());
/// ```
pub fn compose_config_string(config: &str, org_token: Option<&str>, want_pepper: bool) -> Result<String> {
    let mut parts = config.splitn(3, ':');
    let format = parts.next().filter(|f| !f.is_empty()).unwrap_or(DEFAULT_CONFIG);
    let config_org = parts.next().unwrap_or_default();
    let config_pepper = parts.next().unwrap_or_default();

    let org_token = org_token.map(str::trim).unwrap_or_default();
    if !org_token.is_empty() && !config_org.is_empty() && org_token != config_org {
        return Err(IdentError::ConflictingOrganization {
            config: config_org.to_string(),
            flag: org_token.to_string(),
        });
    }
    let org = if org_token.is_empty() { config_org } else { org_token };

    if want_pepper && !config_pepper.is_empty() {
        return Err(IdentError::ConflictingPepper);
    }
    let pepper = if want_pepper {
        generate_pepper()
    } else {
        config_pepper.to_string()
    };

    let mut result = format.to_string();
    if !org.is_empty() || !pepper.is_empty() {
        result.push(':');
        result.push_str(org);
    }
    if !pepper.is_empty() {
        result.push(':');
        result.push_str(&pepper);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve_token_type;
    use tempfile::TempDir;

    fn channels(list: &[&str]) -> Option<Vec<String>> {
        Some(list.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_parse_full_file() {
        let text = "\
pkgident: full:acme
default_channels:
  - https://repo.example.com/main
channel_alias: https://repo.example.com
repo_tokens:
  https://repo.example.com/: tok123
add_repo_token: true
pkgident_heartbeat: 'yes'
ssl_verify: false
";
        let config = BakedConfig::parse(text).unwrap();
        assert_eq!(config.config.as_deref(), Some("full:acme"));
        assert_eq!(config.default_channels, channels(&["https://repo.example.com/main"]));
        assert_eq!(config.repo_tokens.get("https://repo.example.com/"), Some("tok123"));
        assert_eq!(config.add_repo_token, Some(true));
        assert_eq!(config.heartbeat, HeartbeatSetting::Enabled);
        assert_eq!(config.other.get("ssl_verify"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_parse_empty() {
        assert!(BakedConfig::parse("").unwrap().is_empty());
        assert!(BakedConfig::parse("pkgident_heartbeat: ~\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_tolerates_bad_values() {
        let text = "\
pkgident: full:acme
default_channels: https://repo.example.com/main
channel_alias: 5
add_repo_token: yes
repo_tokens:
  https://repo.example.com/: tok123
pkgident_heartbeat: [1, 2]
";
        let config = BakedConfig::parse(text).unwrap();
        assert_eq!(config.config.as_deref(), Some("full:acme"));
        assert_eq!(config.default_channels, channels(&["https://repo.example.com/main"]));
        assert_eq!(config.channel_alias, None);
        assert_eq!(config.add_repo_token, Some(true));
        assert_eq!(config.repo_tokens.get("https://repo.example.com/"), Some("tok123"));
        assert!(config.heartbeat.is_disabled());
        assert!(config.other.is_empty());
    }

    #[test]
    fn test_parse_rejects_non_mapping() {
        let err = BakedConfig::parse("- a\n- b\n").unwrap_err();
        assert!(matches!(err, IdentError::InvalidConfigValue { .. }));
        assert!(BakedConfig::parse("pkgident: [unclosed\n").is_err());
    }

    #[test]
    fn test_heartbeat_values() {
        assert_eq!(HeartbeatSetting::parse("TRUE"), HeartbeatSetting::Enabled);
        assert_eq!(HeartbeatSetting::parse("no"), HeartbeatSetting::Disabled);
        assert_eq!(
            HeartbeatSetting::parse("https://repo.example.com/main"),
            HeartbeatSetting::Url("https://repo.example.com/main".to_string())
        );
        let config = BakedConfig::parse("pkgident_heartbeat: 1\n").unwrap();
        assert!(config.heartbeat.is_enabled());
        let config = BakedConfig::parse("pkgident_heartbeat: 0\n").unwrap();
        assert!(config.heartbeat.is_disabled());
    }

    #[test]
    fn test_heartbeat_from_config_value() {
        let url = "https://hb.example.com/ping";
        assert_eq!(
            HeartbeatSetting::from_config_value(&ConfigValue::Str(url.to_string())),
            HeartbeatSetting::Url(url.to_string())
        );
        assert_eq!(
            HeartbeatSetting::from_config_value(&ConfigValue::Bool(true)),
            HeartbeatSetting::Enabled
        );
        assert_eq!(
            HeartbeatSetting::from_config_value(&ConfigValue::Str("no".to_string())),
            HeartbeatSetting::Disabled
        );
    }

    #[test]
    fn test_write_read_and_remove() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etc/pkgident.yml");
        let mut config = BakedConfig::default();
        config.config = Some("userhost".to_string());
        config.other.insert("ssl_verify".to_string(), Value::Bool(true));
        config.write(&path).unwrap();

        let loaded = BakedConfig::read(&path).unwrap().unwrap();
        assert_eq!(loaded, config);
        assert!(!backup_path(&path).exists());

        config.config = Some("full".to_string());
        config.write(&path).unwrap();
        assert_eq!(BakedConfig::read(&path).unwrap().unwrap().config.as_deref(), Some("full"));
        assert!(!backup_path(&path).exists());

        BakedConfig::default().write(&path).unwrap();
        assert!(!path.exists());
        assert!(BakedConfig::read(&path).unwrap().is_none());
    }

    #[test]
    fn test_failed_write_restores_original() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pkgident.yml");
        fs::write(&path, "pkgident: full\n").unwrap();

        let err = replace_with_backup(&path, "pkgident: userhost\n", |path, _| {
            fs::write(path, "pkgid")?;
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        })
        .unwrap_err();

        assert!(matches!(err, IdentError::ConfigWrite { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "pkgident: full\n");
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_failed_first_write_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etc/pkgident.yml");
        let result = replace_with_backup(&path, "pkgident: full\n", |_, _| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        });
        assert!(result.is_err());
        assert!(!path.exists());
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_apply_config_string() {
        let mut config = BakedConfig::default();
        let changes = ConfigChanges {
            config: Some("full:acme".to_string()),
            ..Default::default()
        };
        assert!(config.apply(&changes).unwrap());
        assert_eq!(config.config.as_deref(), Some("full:acme"));
        assert!(!config.apply(&changes).unwrap());

        let reset = ConfigChanges {
            config: Some("default".to_string()),
            ..Default::default()
        };
        assert!(config.apply(&reset).unwrap());
        assert_eq!(config.config, None);
    }

    #[test]
    fn test_apply_channels() {
        let mut config = BakedConfig::default();
        let changes = ConfigChanges {
            default_channels: channels(&[
                "https://repo.example.com/main/, https://repo.example.com/r",
                "https://repo.example.com/main",
            ]),
            channel_alias: Some("https://repo.example.com/".to_string()),
            ..Default::default()
        };
        config.apply(&changes).unwrap();
        assert_eq!(
            config.default_channels,
            channels(&["https://repo.example.com/main", "https://repo.example.com/r"])
        );
        assert_eq!(config.channel_alias.as_deref(), Some("https://repo.example.com"));

        let clear = ConfigChanges {
            default_channels: channels(&[""]),
            channel_alias: Some(String::new()),
            ..Default::default()
        };
        config.apply(&clear).unwrap();
        assert_eq!(config.default_channels, None);
        assert_eq!(config.channel_alias, None);
    }

    #[test]
    fn test_apply_repo_token_anchor() {
        let mut config = BakedConfig::default();
        let changes = ConfigChanges {
            default_channels: channels(&["main", "https://repo.example.com:8443/org/main"]),
            repo_token: Some(" tok123 ".to_string()),
            ..Default::default()
        };
        config.apply(&changes).unwrap();
        assert_eq!(
            config.repo_tokens.get("https://repo.example.com:8443/"),
            Some("tok123")
        );
        assert_eq!(config.add_repo_token, Some(true));

        let clear = ConfigChanges {
            repo_token: Some(String::new()),
            ..Default::default()
        };
        config.apply(&clear).unwrap();
        assert!(config.repo_tokens.is_empty());
        assert_eq!(config.add_repo_token, None);
    }

    #[test]
    fn test_apply_repo_token_from_alias() {
        let mut config = BakedConfig::default();
        let changes = ConfigChanges {
            channel_alias: Some("https://mirror.example.org/conda".to_string()),
            repo_token: Some("abc".to_string()),
            ..Default::default()
        };
        config.apply(&changes).unwrap();
        assert_eq!(config.repo_tokens.get("https://mirror.example.org/"), Some("abc"));
    }

    #[test]
    fn test_apply_repo_token_without_channel() {
        let mut config = BakedConfig::default();
        config.config = Some("full".to_string());
        let before = config.clone();
        let changes = ConfigChanges {
            config: Some("userhost".to_string()),
            repo_token: Some("abc".to_string()),
            ..Default::default()
        };
        let err = config.apply(&changes).unwrap_err();
        assert!(matches!(err, IdentError::RepoTokenWithoutChannel));
        assert_eq!(config, before);
    }

    #[test]
    fn test_apply_heartbeat() {
        let mut config = BakedConfig::default();
        let on = ConfigChanges {
            heartbeat: Some(true),
            ..Default::default()
        };
        assert!(config.apply(&on).unwrap());
        assert!(config.heartbeat.is_enabled());
        let off = ConfigChanges {
            heartbeat: Some(false),
            ..Default::default()
        };
        assert!(config.apply(&off).unwrap());
        assert!(config.is_empty());
    }

    #[test]
    fn test_compose_config_string() {
        assert_eq!(compose_config_string("", None, false).unwrap(), "default");
        assert_eq!(compose_config_string("full:acme", Some("acme"), false).unwrap(), "full:acme");
        assert_eq!(compose_config_string("full::abc", None, false).unwrap(), "full::abc");
        assert!(matches!(
            compose_config_string("full::abc", None, true),
            Err(IdentError::ConflictingPepper)
        ));
    }

    #[test]
    fn test_compose_with_fresh_pepper() {
        let composed = compose_config_string("fullhash", Some("acme"), true).unwrap();
        let resolved = resolve_token_type(&composed);
        assert_eq!(resolved.organization.as_deref(), Some("acme"));
        assert_eq!(resolved.pepper.map(|p| p.len()), Some(16));
    }
}
