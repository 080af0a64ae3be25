//! Per-run identification context
//!
//! [`IdentSettings`] collects the paths and process inputs for one run.
//! [`IdentContext`] owns the lazily computed identifiers and the resolved
//! token configuration; the composition root builds exactly one per process
//! and shares it with the assembler and the token lookups.

use once_cell::sync::OnceCell;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::{
    ident_parameters, raw_config, resolve_token_type, ConfigSource, LayeredConfig, RawConfig,
    ResolvedTokenType, CONFIG_ENV_VAR,
};
use crate::error::{IdentError, Result};
use crate::ident::{
    environment_name, get_or_create_identifier, hash_string, HostValues, SessionIdentifier,
    SystemHost, MIN_CLIENT_TOKEN_LEN,
};

/// Application directory name under the platform config/data dirs
pub const APP_DIR: &str = "pkgident";
/// Baked configuration file, relative to the install prefix
pub const BAKED_CONFIG_FILE: &str = "etc/pkgident.yml";
/// Per-environment configuration file name
pub const ENV_CONFIG_FILE: &str = ".pkgidentrc";

/// Paths and process-level inputs for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentSettings {
    /// Root of the package-manager installation
    pub install_prefix: PathBuf,
    /// Environment the current command targets
    pub env_prefix: PathBuf,
    pub client_token_path: PathBuf,
    pub machine_token_path: PathBuf,
    pub baked_config_path: PathBuf,
    /// Directory of locally stored repository auth tokens
    pub token_dir: PathBuf,
    /// Directory holding the per-user `config.yml`
    pub user_config_dir: Option<PathBuf>,
    /// Explicit per-call configuration string
    pub config_override: Option<String>,
    /// Value of [`CONFIG_ENV_VAR`] captured at start-up
    pub env_config: Option<String>,
}

impl IdentSettings {
    /// Settings for the installation that contains the running executable
    ///
    /// The executable is expected at `<prefix>/bin/<name>`.
    pub fn from_env() -> Result<Self> {
        let exe = env::current_exe()?;
        let prefix = exe
            .parent()
            .and_then(Path::parent)
            .ok_or(IdentError::NoPlatformDir("install prefix"))?;
        Ok(Self::for_prefix(prefix).capture_env())
    }

    /// Settings rooted at `prefix`, with platform defaults for the rest
    ///
    /// # Example
    /// ```
    /// # use pkgident_core::IdentSettings;
    /// let settings = IdentSettings::for_prefix("/opt/tool");
    /// assert!(settings.baked_config_path.ends_with("etc/pkgident.yml"));
    /// assert_eq!(settings.env_prefix, settings.install_prefix);
    /// ```
    pub fn for_prefix(prefix: impl AsRef<Path>) -> Self {
        let prefix = prefix.as_ref().to_path_buf();
        let user_config_dir = dirs::config_dir().map(|d| d.join(APP_DIR));
        let config_dir = user_config_dir
            .clone()
            .unwrap_or_else(|| prefix.join("etc").join(APP_DIR));
        let data_dir = dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| prefix.join("var").join(APP_DIR));

        Self {
            env_prefix: prefix.clone(),
            client_token_path: config_dir.join("client_token"),
            machine_token_path: default_machine_token_path(&prefix),
            baked_config_path: prefix.join(BAKED_CONFIG_FILE),
            token_dir: data_dir.join("tokens"),
            user_config_dir,
            install_prefix: prefix,
            config_override: None,
            env_config: None,
        }
    }

    /// Read [`CONFIG_ENV_VAR`] from the process environment
    pub fn capture_env(mut self) -> Self {
        self.env_config = env::var(CONFIG_ENV_VAR).ok().filter(|v| !v.is_empty());
        self
    }

    pub fn with_env_prefix(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_prefix = path.into();
        self
    }

    pub fn with_client_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_token_path = path.into();
        self
    }

    pub fn with_machine_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.machine_token_path = path.into();
        self
    }

    pub fn with_baked_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.baked_config_path = path.into();
        self
    }

    pub fn with_token_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_dir = path.into();
        self
    }

    pub fn with_user_config_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_config_dir = Some(path.into());
        self
    }

    pub fn with_config_override(mut self, value: impl Into<String>) -> Self {
        self.config_override = Some(value.into());
        self
    }

    pub fn with_env_config(mut self, value: Option<String>) -> Self {
        self.env_config = value;
        self
    }

    /// User-settable configuration files, highest priority first
    pub fn user_config_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(dir) = &self.user_config_dir {
            paths.push(dir.join("config.yml"));
        }
        paths.push(self.env_prefix.join(ENV_CONFIG_FILE));
        paths
    }

    /// Layered configuration: the baked file, then the user files
    pub fn layered_config(&self) -> LayeredConfig {
        self.user_config_paths()
            .iter()
            .fold(
                LayeredConfig::new().with_baked_file(&self.baked_config_path),
                |config, path| config.with_file(path),
            )
    }
}

#[cfg(unix)]
fn default_machine_token_path(_prefix: &Path) -> PathBuf {
    PathBuf::from("/var/lib").join(APP_DIR).join("machine_token")
}

#[cfg(windows)]
fn default_machine_token_path(prefix: &Path) -> PathBuf {
    env::var_os("ProgramData")
        .map(PathBuf::from)
        .unwrap_or_else(|| prefix.to_path_buf())
        .join(APP_DIR)
        .join("machine_token")
}

#[cfg(not(any(unix, windows)))]
fn default_machine_token_path(prefix: &Path) -> PathBuf {
    prefix.join("etc").join(APP_DIR).join("machine_token")
}

/// Identification state for one process run
pub struct IdentContext {
    settings: IdentSettings,
    config: Box<dyn ConfigSource>,
    host: Box<dyn HostValues>,
    client: OnceCell<String>,
    machine: OnceCell<String>,
    session: SessionIdentifier,
    raw: OnceCell<RawConfig>,
    token_type: OnceCell<ResolvedTokenType>,
}

impl IdentContext {
    /// Create a context over a host configuration source
    ///
    /// Registers the identification keys on `config`.
    pub fn new(settings: IdentSettings, mut config: Box<dyn ConfigSource>) -> Self {
        for spec in ident_parameters() {
            config.register_parameter(spec);
        }
        Self {
            settings,
            config,
            host: Box::new(SystemHost),
            client: OnceCell::new(),
            machine: OnceCell::new(),
            session: SessionIdentifier::new(),
            raw: OnceCell::new(),
            token_type: OnceCell::new(),
        }
    }

    /// Create a context backed by the settings' layered YAML files
    pub fn from_settings(settings: IdentSettings) -> Self {
        let config = settings.layered_config();
        Self::new(settings, Box::new(config))
    }

    /// Replace the host value source
    pub fn with_host(mut self, host: Box<dyn HostValues>) -> Self {
        self.host = host;
        self
    }

    pub fn settings(&self) -> &IdentSettings {
        &self.settings
    }

    pub fn config(&self) -> &dyn ConfigSource {
        self.config.as_ref()
    }

    pub fn host(&self) -> &dyn HostValues {
        self.host.as_ref()
    }

    /// Installation-wide client identifier
    pub fn client_token(&self) -> &str {
        self.client.get_or_init(|| {
            get_or_create_identifier(&self.settings.client_token_path, MIN_CLIENT_TOKEN_LEN)
        })
    }

    /// Machine-wide identifier
    pub fn machine_token(&self) -> &str {
        self.machine.get_or_init(|| {
            get_or_create_identifier(&self.settings.machine_token_path, MIN_CLIENT_TOKEN_LEN)
        })
    }

    pub fn session_token(&self) -> &str {
        self.session.get()
    }

    /// Hash of the client identifier and the environment path
    pub fn environment_token(&self) -> String {
        let value = format!("{}{}", self.client_token(), self.settings.env_prefix.display());
        hash_string("prefix", &value, None)
    }

    pub fn environment_name(&self) -> Option<String> {
        environment_name(&self.settings.env_prefix, &self.settings.install_prefix)
    }

    /// Raw configuration string and where it came from
    pub fn raw_config(&self) -> &RawConfig {
        self.raw.get_or_init(|| {
            raw_config(
                self.settings.config_override.as_deref(),
                self.settings.env_config.as_deref(),
                self.config.as_ref(),
            )
        })
    }

    /// Resolved token configuration, computed once per run
    pub fn token_type(&self) -> &ResolvedTokenType {
        self.token_type.get_or_init(|| {
            let raw = self.raw_config();
            debug!("Token config source: {}", raw.origin);
            resolve_token_type(&raw.value)
        })
    }
}

impl std::fmt::Debug for IdentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentContext")
            .field("settings", &self.settings)
            .field("token_type", &self.token_type.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigLocation, ConfigOrigin, CONFIG_KEY};
    use crate::types::TokenCode;
    use serde_yaml::{Mapping, Value};
    use std::fs;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> IdentSettings {
        IdentSettings::for_prefix(dir.path().join("prefix"))
            .with_client_token_path(dir.path().join("client_token"))
            .with_machine_token_path(dir.path().join("machine_token"))
            .with_token_dir(dir.path().join("tokens"))
            .with_user_config_dir(dir.path().join("user"))
            .with_env_config(None)
    }

    #[test]
    fn test_for_prefix_layout() {
        let settings = IdentSettings::for_prefix("/opt/tool");
        assert_eq!(settings.install_prefix, PathBuf::from("/opt/tool"));
        assert_eq!(
            settings.baked_config_path,
            PathBuf::from("/opt/tool/etc/pkgident.yml")
        );
        assert!(settings.client_token_path.ends_with("pkgident/client_token"));
        assert!(settings.machine_token_path.ends_with("pkgident/machine_token"));
        assert!(settings.token_dir.ends_with("pkgident/tokens"));
        assert_eq!(settings.config_override, None);
    }

    #[test]
    fn test_user_config_paths_end_with_env_file() {
        let settings = IdentSettings::for_prefix("/opt/tool").with_env_prefix("/opt/tool/envs/dev");
        let paths = settings.user_config_paths();
        assert_eq!(
            paths.last(),
            Some(&PathBuf::from("/opt/tool/envs/dev/.pkgidentrc"))
        );
    }

    #[test]
    fn test_user_config_dir_is_read() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        assert_eq!(
            settings.user_config_paths().first(),
            Some(&dir.path().join("user").join("config.yml"))
        );

        fs::create_dir_all(dir.path().join("user")).unwrap();
        fs::write(dir.path().join("user/config.yml"), "pkgident: userhost\n").unwrap();
        let context = IdentContext::from_settings(settings);
        assert_eq!(context.raw_config().value, "userhost");
        assert_eq!(
            context.raw_config().origin,
            ConfigOrigin::Config(ConfigLocation::File(dir.path().join("user/config.yml")))
        );
    }

    #[test]
    fn test_client_token_memoized_and_persisted() {
        let dir = TempDir::new().unwrap();
        let context = IdentContext::from_settings(settings(&dir));
        let token = context.client_token().to_string();
        assert_eq!(token.len(), MIN_CLIENT_TOKEN_LEN);
        assert_eq!(context.client_token(), token);

        let stored = fs::read_to_string(dir.path().join("client_token")).unwrap();
        assert_eq!(stored.trim_end(), token);
    }

    #[test]
    fn test_environment_token_depends_on_prefix() {
        let dir = TempDir::new().unwrap();
        let base = IdentContext::from_settings(settings(&dir));
        let other = IdentContext::from_settings(
            settings(&dir).with_env_prefix(dir.path().join("prefix/envs/dev")),
        );
        assert_eq!(base.client_token(), other.client_token());
        assert_ne!(base.environment_token(), other.environment_token());
        assert_eq!(base.environment_token(), base.environment_token());
        assert_eq!(base.environment_name().as_deref(), Some("base"));
        assert_eq!(other.environment_name().as_deref(), Some("dev"));
    }

    #[test]
    fn test_token_type_from_config_layer() {
        let dir = TempDir::new().unwrap();
        let mut data = Mapping::new();
        data.insert(Value::from(CONFIG_KEY), Value::from("userhost:acme"));
        let location = ConfigLocation::File(dir.path().join("config.yml"));
        let config = LayeredConfig::new().with_layer(location.clone(), data);

        let context = IdentContext::new(settings(&dir), Box::new(config));
        assert_eq!(context.raw_config().origin, ConfigOrigin::Config(location));
        assert!(context.token_type().contains(TokenCode::Organization));
        assert_eq!(context.token_type().codes_string(), "cseuho");
    }

    #[test]
    fn test_override_beats_environment() {
        let dir = TempDir::new().unwrap();
        let context = IdentContext::from_settings(
            settings(&dir)
                .with_env_config(Some("full".to_string()))
                .with_config_override("none"),
        );
        assert_eq!(context.raw_config().origin, ConfigOrigin::Override);
        assert!(context.token_type().codes.is_empty());
    }

    #[test]
    fn test_registered_default() {
        let dir = TempDir::new().unwrap();
        let context = IdentContext::from_settings(settings(&dir));
        assert_eq!(context.raw_config().value, "default");
        assert_eq!(context.token_type().codes_string(), "cse");
    }
}
