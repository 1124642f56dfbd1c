//! Bot configuration.
//!
//! Config file lives at `~/.config/fossbot/config.toml`. Every field is
//! optional; command-line flags override the file, and the file
//! overrides the built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use fossbot_sdk::client::ConnectConfig;
use fossbot_sdk::dispatch::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_MAX_WORKERS};
use serde::Deserialize;

pub const DEFAULT_SERVER: &str = "chat.freenode.net";
pub const DEFAULT_PORT: u16 = 6667;
pub const DEFAULT_NICK: &str = "fossbot";
pub const DEFAULT_CHANNEL: &str = "#foss-teimes";
pub const BOT_VERSION: &str = concat!("fossbot ", env!("CARGO_PKG_VERSION"));

/// Contents of `config.toml`.
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub server: Option<String>,
    pub port: Option<u16>,
    pub nick: Option<String>,
    /// Username (ident). Defaults to the nick.
    pub user: Option<String>,
    pub channels: Option<Vec<String>>,
    pub verbose: Option<bool>,
    /// NickServ password.
    pub nick_password: Option<String>,
    /// CTCP VERSION reply.
    pub bot_version: Option<String>,
    /// Nicks allowed to run privileged commands.
    pub admins: Option<Vec<String>>,
    pub command_timeout_secs: Option<u64>,
    pub max_workers: Option<usize>,
}

/// Command-line overrides. Flattened into the binary's parser.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct Overrides {
    /// IRC server host
    #[arg(long)]
    pub server: Option<String>,

    /// IRC server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Bot nick
    #[arg(long)]
    pub nick: Option<String>,

    /// Username (ident)
    #[arg(long)]
    pub user: Option<String>,

    /// Channels to join, comma separated
    #[arg(long)]
    pub channels: Option<String>,

    /// Log raw protocol traffic
    #[arg(short, long)]
    pub verbose: bool,

    /// NickServ password
    #[arg(long, env = "FOSSBOT_NICK_PASSWORD", hide_env_values = true)]
    pub nick_password: Option<String>,

    /// Admin nicks for privileged commands, comma separated
    #[arg(long)]
    pub admins: Option<String>,
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fossbot")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

impl Config {
    /// Load the default config file. A missing file is an empty config.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("can't read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("bad config file {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Effective settings after merging CLI > config file > defaults.
#[derive(Clone)]
pub struct Resolved {
    pub server: String,
    pub port: u16,
    pub nick: String,
    pub user: String,
    pub channels: Vec<String>,
    pub verbose: bool,
    pub nick_password: Option<String>,
    pub bot_version: String,
    pub admins: Vec<String>,
    pub command_timeout: Duration,
    pub max_workers: usize,
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Resolved {
    pub fn merge(cli: &Overrides, config: &Config) -> Self {
        let server = cli
            .server
            .clone()
            .or_else(|| config.server.clone())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());
        let port = cli.port.or(config.port).unwrap_or(DEFAULT_PORT);

        let nick = cli
            .nick
            .clone()
            .or_else(|| config.nick.clone())
            .unwrap_or_else(|| DEFAULT_NICK.to_string());
        let user = cli
            .user
            .clone()
            .or_else(|| config.user.clone())
            .unwrap_or_else(|| nick.clone());

        let channels = if let Some(ref ch) = cli.channels {
            split_list(ch)
        } else if let Some(ref ch) = config.channels {
            ch.clone()
        } else {
            vec![DEFAULT_CHANNEL.to_string()]
        };

        let admins = match (&cli.admins, &config.admins) {
            (Some(list), _) => split_list(list),
            (None, Some(list)) => list.clone(),
            (None, None) => Vec::new(),
        };

        Self {
            server,
            port,
            nick,
            user,
            channels,
            verbose: cli.verbose || config.verbose.unwrap_or(false),
            nick_password: cli
                .nick_password
                .clone()
                .or_else(|| config.nick_password.clone())
                .filter(|p| !p.is_empty()),
            bot_version: config
                .bot_version
                .clone()
                .unwrap_or_else(|| BOT_VERSION.to_string()),
            admins,
            command_timeout: config
                .command_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT),
            max_workers: config.max_workers.unwrap_or(DEFAULT_MAX_WORKERS),
        }
    }

    pub fn connect_config(&self) -> ConnectConfig {
        ConnectConfig {
            address: self.server.clone(),
            port: self.port,
            nick: self.nick.clone(),
            user: self.user.clone(),
            channels: self.channels.clone(),
            nick_password: self.nick_password.clone(),
            bot_version: self.bot_version.clone(),
            command_timeout: self.command_timeout,
            max_workers: self.max_workers,
            ..ConnectConfig::default()
        }
    }
}
