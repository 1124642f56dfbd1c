//! fossbot: IRC bot with network diagnostics, GitHub and URL commands.
//!
//! Connects to one server, joins the configured channels and answers
//! commands:
//!
//!   !list / !help               List commands
//!   !url <link>                 Shorten a link
//!   !github <user/repo> [n]     Latest commits
//!   !ping <host> [count]        Ping a host
//!   !traceroute <host>          Trace the route (results sent privately)
//!   !dns <host>                 Name lookup
//!   !fail                       A quote
//!   !quit [message]             Disconnect (identified admins only)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fossbot_sdk::client;

use fossbot::commands;
use fossbot::config::{Config, Overrides, Resolved};

#[derive(Parser)]
#[command(name = "fossbot", version, about = "IRC bot for the FOSS channel")]
struct Cli {
    /// Config file (default: ~/.config/fossbot/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Can't listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Ctrl+C received, quitting");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let settings = Resolved::merge(&cli.overrides, &file);

    let default_filter = if settings.verbose {
        "fossbot=debug,fossbot_sdk=debug"
    } else {
        "fossbot=info,fossbot_sdk=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let config = settings.connect_config();
    tracing::info!(
        server = %config.address,
        port = config.port,
        nick = %config.nick,
        channels = ?config.channels,
        "Starting fossbot"
    );

    let commands = Arc::new(commands::table(settings.admins.clone())?);
    tracing::debug!(?commands, "Commands registered");

    let stream = client::connect(&config)
        .await
        .with_context(|| format!("connecting to {}:{}", config.address, config.port))?;

    tracing::info!("Bot running. Ctrl+C to stop.");
    // A hangup without a prior QUIT is an error.
    client::run(stream, &config, commands, shutdown_signal())
        .await
        .context("IRC connection closed")?;
    Ok(())
}
