//! pkgident
//!
//! Inspects and edits the anonymous telemetry configuration of a
//! package-manager installation: the baked config file, stored repository
//! tokens, and the token string sent with requests.

mod commands;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pkgident_core::IdentSettings;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable that turns on debug logging
const DEBUG_ENV_VAR: &str = "PKGIDENT_DEBUG";

/// Exit status for fatal configuration errors
const EXIT_FATAL: u8 = 255;

/// pkgident - anonymous usage tokens for package-manager requests
#[derive(Parser, Debug)]
#[command(name = "pkgident")]
#[command(author = "pkgident Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Manage anonymous telemetry tokens for a package-manager install", long_about = None)]
struct Cli {
    /// Install prefix (default: the installation containing this executable)
    #[arg(long, global = true)]
    prefix: Option<PathBuf>,

    /// Environment prefix used for environment tokens (default: install prefix)
    #[arg(long, global = true)]
    env_prefix: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the baked configuration and the resolved token string
    Status {
        /// Emit a JSON report
        #[arg(long)]
        json: bool,
    },
    /// Change the baked configuration
    Configure(ConfigureArgs),
    /// Remove the baked configuration file
    Clean,
    /// Print the token string for the current settings
    Show {
        /// Print as an X-Pkg-Ident header line
        #[arg(long)]
        header: bool,

        /// Use this configuration string instead of the configured one
        #[arg(long)]
        config: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct ConfigureArgs {
    /// Telemetry configuration string; empty reverts to the default
    #[arg(long)]
    pub config: Option<String>,

    /// Organization string to merge into the configuration
    #[arg(long)]
    pub org_token: Option<String>,

    /// Generate a random pepper for the hashed token variants
    #[arg(long)]
    pub pepper: bool,

    /// Default channel; repeat or separate with commas, empty clears the list
    #[arg(long = "default-channel")]
    pub default_channels: Vec<String>,

    /// Channel alias; empty clears it
    #[arg(long)]
    pub channel_alias: Option<String>,

    /// Repository auth token, anchored at the first channel URL; empty clears
    #[arg(long)]
    pub repo_token: Option<String>,

    /// Enable the activation heartbeat setting
    #[arg(long, conflicts_with = "no_heartbeat")]
    pub heartbeat: bool,

    /// Disable the activation heartbeat setting
    #[arg(long)]
    pub no_heartbeat: bool,

    /// Write repository tokens to the token directory
    #[arg(long)]
    pub write_token: bool,

    /// Remove stored tokens that conflict with the repository tokens
    #[arg(long)]
    pub clear_old_token: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_logging(&cli.log_level) {
        eprintln!("WARNING: {:#}", e);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = match &cli.prefix {
        Some(prefix) => IdentSettings::for_prefix(prefix).capture_env(),
        None => IdentSettings::from_env().context("Unable to locate the install prefix")?,
    };
    if let Some(env_prefix) = cli.env_prefix {
        settings = settings.with_env_prefix(env_prefix);
    }
    debug!("Install prefix: {}", settings.install_prefix.display());

    match cli.command {
        Command::Status { json } => commands::status(settings, json),
        Command::Configure(args) => commands::configure(&settings, &args),
        Command::Clean => commands::clean(&settings),
        Command::Show { header, config } => commands::show(settings, header, config),
    }
}

/// Setup logging with tracing
///
/// A non-empty `PKGIDENT_DEBUG` forces debug output.
fn setup_logging(level: &str) -> Result<()> {
    let forced = env::var(DEBUG_ENV_VAR).is_ok_and(|v| !v.is_empty());
    let log_level = if forced {
        Level::DEBUG
    } else {
        level.parse::<Level>().unwrap_or(Level::WARN)
    };

    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}
