//! Minimal bot on top of the session engine.
//!
//! Usage:
//!   cargo run --example echo_bot -- --server irc.libera.chat --channel "#bots"
//!
//! Answers `!echo <text>` and `!whoami` (asks NickServ whether the caller
//! is identified). Ctrl+C sends QUIT and exits.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use fossbot_sdk::client::{self, ConnectConfig};
use fossbot_sdk::command::CommandTable;
use fossbot_sdk::dispatch::BotContext;
use fossbot_sdk::message::ParsedMessage;

#[derive(Parser)]
#[command(name = "echo-bot", about = "fossbot-sdk example bot")]
struct Args {
    #[arg(long, default_value = "irc.libera.chat")]
    server: String,
    #[arg(long, default_value_t = 6667)]
    port: u16,
    #[arg(long, default_value = "echobot")]
    nick: String,
    #[arg(long, default_value = "#bots")]
    channel: String,
}

async fn echo(ctx: BotContext, msg: ParsedMessage) -> Result<()> {
    if !msg.params.is_empty() {
        ctx.say(msg.reply_target(), &msg.params)?;
    }
    Ok(())
}

async fn whoami(ctx: BotContext, msg: ParsedMessage) -> Result<()> {
    let reply = match ctx.is_registered_user(&msg.sender).await {
        Ok(true) => format!("{}: you are identified", msg.sender),
        Ok(false) => format!("{}: you are not identified", msg.sender),
        Err(e) => format!("{}: can't tell ({e})", msg.sender),
    };
    ctx.say(msg.reply_target(), &reply)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = ConnectConfig {
        address: args.server,
        port: args.port,
        nick: args.nick.clone(),
        user: args.nick,
        channels: vec![args.channel],
        ..ConnectConfig::default()
    };

    let commands = Arc::new(
        CommandTable::builder()
            .bot("echo", "Repeat the arguments", echo)
            .bot("whoami", "Ask NickServ about yourself", whoami)
            .build(),
    );

    let stream = client::connect(&config).await?;
    client::run(stream, &config, commands, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}
