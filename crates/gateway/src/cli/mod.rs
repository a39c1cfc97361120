pub mod config;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use sa_domain::config::Config;

/// A multi-tenant conversational agent runtime.
#[derive(Debug, Parser)]
#[command(name = "agentd", version, about)]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Interactive chat over stdin/stdout.
    Chat {
        /// User id the conversation is keyed by.
        #[arg(long, default_value = "cli:local")]
        user: String,
    },
    /// Send a single message to the agent and print the reply.
    Run {
        /// The message to send.
        message: String,
        /// User id the conversation is keyed by.
        #[arg(long, default_value = "cli:run")]
        user: String,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load the config file, or fall back to all defaults when it doesn't
/// exist (every section defaults, so a missing file is a valid setup
/// for local experimentation).
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}
