//! Subcommand implementations

use anyhow::{Context, Result};
use pkgident_core::auth::RepoTokenStore;
use pkgident_core::baked::{compose_config_string, BakedConfig, ConfigChanges, HeartbeatSetting};
use pkgident_core::config::{
    redact_config, ConfigSource, ConfigValue, ADD_REPO_TOKEN_KEY, CHANNEL_ALIAS_KEY,
    DEFAULT_CHANNELS_KEY, HEARTBEAT_KEY, REPO_TOKENS_KEY,
};
use pkgident_core::{IdentContext, IdentSettings, TokenAssembler, TokenTable, IDENT_HEADER};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::ConfigureArgs;

/// Characters of a repo token shown in reports
const TOKEN_PREVIEW_LEN: usize = 6;

/// Snapshot printed by `pkgident status`
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub baked_file: String,
    pub baked_present: bool,
    pub config: Option<String>,
    pub default_channels: Option<Vec<String>>,
    pub channel_alias: Option<String>,
    /// Tokens truncated to their first characters
    pub repo_tokens: TokenTable,
    pub heartbeat: HeartbeatSetting,
    pub token_config: String,
    pub token_config_source: String,
    pub token_codes: String,
    pub token_string: String,
    /// Host keys as the layered configuration resolves them
    pub effective: Vec<EffectiveSetting>,
}

/// One key read through the host configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveSetting {
    pub key: &'static str,
    pub value: String,
    pub source: String,
}

impl EffectiveSetting {
    fn read(config: &dyn ConfigSource, key: &'static str) -> Option<Self> {
        let (value, location) = config.get_config_value(key)?;
        let value = match (key, &value) {
            (HEARTBEAT_KEY, value) => heartbeat_label(&HeartbeatSetting::from_config_value(value)),
            (_, ConfigValue::Str(s)) => s.clone(),
            (_, ConfigValue::Bool(b)) => b.to_string(),
            (_, ConfigValue::List(items)) => items.join(", "),
            (_, ConfigValue::Map(entries)) => entries
                .iter()
                .map(|(url, token)| format!("{}={}", url, preview(token)))
                .collect::<Vec<_>>()
                .join(", "),
        };
        Some(Self {
            key,
            value,
            source: location.to_string(),
        })
    }
}

/// Host keys listed in the status report
const EFFECTIVE_KEYS: [&str; 5] = [
    DEFAULT_CHANNELS_KEY,
    CHANNEL_ALIAS_KEY,
    REPO_TOKENS_KEY,
    ADD_REPO_TOKEN_KEY,
    HEARTBEAT_KEY,
];

impl StatusReport {
    pub fn collect(settings: IdentSettings) -> Result<Self> {
        let path = settings.baked_config_path.clone();
        let baked = BakedConfig::read(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        let baked_present = baked.is_some();
        let baked = baked.unwrap_or_default();

        let assembler = TokenAssembler::new(Arc::new(IdentContext::from_settings(settings)));
        let context = assembler.context();
        let raw = context.raw_config();
        let effective = EFFECTIVE_KEYS
            .iter()
            .filter_map(|&key| EffectiveSetting::read(context.config(), key))
            .collect();

        Ok(Self {
            baked_file: path.display().to_string(),
            baked_present,
            config: baked.config.as_deref().map(redact_config),
            default_channels: baked.default_channels.clone(),
            channel_alias: baked.channel_alias.clone(),
            repo_tokens: baked
                .repo_tokens
                .iter()
                .map(|(url, token)| (url.to_string(), preview(token)))
                .collect(),
            heartbeat: baked.heartbeat.clone(),
            token_config: redact_config(&raw.value),
            token_config_source: raw.origin.to_string(),
            token_codes: context.token_type().codes_string(),
            token_string: assembler.build_token_string().to_string(),
            effective,
        })
    }

    fn print(&self) {
        println!("{}:", self.baked_file);
        if !self.baked_present {
            println!("  <not present>");
        } else {
            println!("  user agent: {}", self.config.as_deref().unwrap_or("default"));
            match &self.default_channels {
                None => println!("  default_channels: <none>"),
                Some(channels) if channels.is_empty() => println!("  default_channels: []"),
                Some(channels) => {
                    println!("  default_channels:");
                    for channel in channels {
                        println!("   - {}", channel);
                    }
                }
            }
            println!(
                "  channel_alias: {}",
                self.channel_alias.as_deref().unwrap_or("<none>")
            );
            if self.repo_tokens.is_empty() {
                println!("  repo tokens: <none>");
            } else {
                println!("  repo tokens:");
                for (url, token) in self.repo_tokens.iter() {
                    println!("  - {}: {}", url, token);
                }
            }
            println!("  heartbeat: {}", heartbeat_label(&self.heartbeat));
        }
        println!("token config: {} ({})", self.token_config, self.token_config_source);
        println!("token codes: {}", display_codes(&self.token_codes));
        println!("token string: {}", self.token_string);
        println!("effective settings:");
        for setting in &self.effective {
            println!("  {}: {} ({})", setting.key, setting.value, setting.source);
        }
    }
}

fn preview(token: &str) -> String {
    let head: String = token.chars().take(TOKEN_PREVIEW_LEN).collect();
    format!("{}...", head)
}

fn heartbeat_label(setting: &HeartbeatSetting) -> String {
    match setting {
        HeartbeatSetting::Disabled => "<none>".to_string(),
        HeartbeatSetting::Enabled => "true".to_string(),
        HeartbeatSetting::Url(url) => url.clone(),
    }
}

fn display_codes(codes: &str) -> &str {
    if codes.is_empty() {
        "<none>"
    } else {
        codes
    }
}

/// `pkgident status`
pub fn status(settings: IdentSettings, json: bool) -> Result<()> {
    let report = StatusReport::collect(settings)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print();
    }
    Ok(())
}

/// Translate command-line flags into baked-file changes
pub fn plan_changes(args: &ConfigureArgs, current: &BakedConfig) -> Result<ConfigChanges> {
    let mut config = args.config.clone();
    if args.org_token.is_some() || args.pepper {
        let base = config
            .as_deref()
            .or(current.config.as_deref())
            .unwrap_or_default();
        config = Some(compose_config_string(base, args.org_token.as_deref(), args.pepper)?);
    }

    let heartbeat = if args.heartbeat {
        Some(true)
    } else if args.no_heartbeat {
        Some(false)
    } else {
        None
    };

    Ok(ConfigChanges {
        config,
        default_channels: (!args.default_channels.is_empty()).then(|| args.default_channels.clone()),
        channel_alias: args.channel_alias.clone(),
        repo_token: args.repo_token.clone(),
        heartbeat,
    })
}

/// `pkgident configure`
pub fn configure(settings: &IdentSettings, args: &ConfigureArgs) -> Result<()> {
    let path = &settings.baked_config_path;
    let mut baked = BakedConfig::read(path)
        .with_context(|| format!("Failed to load {}", path.display()))?
        .unwrap_or_default();

    let changes = plan_changes(args, &baked)?;
    if changes.is_empty() && !(args.write_token || args.clear_old_token) {
        warn!("No changes requested");
    }
    if baked.apply(&changes)? {
        baked.write(path)?;
        println!("updated {}", path.display());
    } else {
        println!("no changes to save");
    }

    if args.write_token || args.clear_old_token {
        let store = RepoTokenStore::new(&settings.token_dir);
        sync_repo_tokens(&store, &baked.repo_tokens, args.write_token)?;
    }
    Ok(())
}

/// Clear conflicting stored tokens, then optionally store the baked ones
pub fn sync_repo_tokens(store: &RepoTokenStore, tokens: &TokenTable, save: bool) -> Result<()> {
    if tokens.is_empty() {
        println!("no tokens to write or clear");
        return Ok(());
    }
    for (url, token) in tokens.iter() {
        for removed in store.remove_conflicting(url)? {
            println!("removing existing token: {}", removed);
        }
        if save {
            let path = store
                .write_token(url, token)
                .with_context(|| format!("Token installation failed for {}", url))?;
            info!("Token file: {}", path.display());
            println!("installing token: {}", url);
        }
    }
    Ok(())
}

/// `pkgident clean`
pub fn clean(settings: &IdentSettings) -> Result<()> {
    let path = &settings.baked_config_path;
    if !path.exists() {
        println!("{}: <not present>", path.display());
        return Ok(());
    }
    BakedConfig::default().write(path)?;
    println!("removed {}", path.display());
    Ok(())
}

/// `pkgident show`
pub fn show(settings: IdentSettings, header: bool, config: Option<String>) -> Result<()> {
    let settings = match config {
        Some(config) => settings.with_config_override(config),
        None => settings,
    };
    let assembler = TokenAssembler::new(Arc::new(IdentContext::from_settings(settings)));
    let token = assembler.build_token_string();
    if header {
        println!("{}: {}", IDENT_HEADER, token);
    } else {
        println!("{}", token);
    }
    Ok(())
}
