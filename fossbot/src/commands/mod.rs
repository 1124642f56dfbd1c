//! Bot commands and the table that maps `!name` to them.

pub mod fun;
pub mod net;
pub mod web;

use std::sync::Arc;

use anyhow::Result;
use fossbot_sdk::command::CommandTable;
use fossbot_sdk::dispatch::{BotCommands, BotContext};
use fossbot_sdk::message::ParsedMessage;

use crate::output;

/// Build the command table. `admins` may run `!quit`.
pub fn table(admins: Vec<String>) -> Result<BotCommands> {
    let web = web::Web::new()?;
    let admins: Arc<[String]> = admins.into();

    let builder = CommandTable::builder()
        .bot("fail", "a random quote", fun::fail)
        .bot("url", "url <link>: shorten a link", {
            let web = web.clone();
            move |ctx, msg| web::url(web.clone(), ctx, msg)
        })
        .bot("github", "github <user/repo> [n]: latest commits", move |ctx, msg| {
            web::github(web.clone(), ctx, msg)
        })
        .bot("ping", "ping <host> [count]", net::ping)
        .bot("traceroute", "traceroute <host>: results sent privately", net::traceroute)
        .bot("dns", "dns <host>: name lookup", net::dns)
        .bot("quit", "quit [message]: disconnect (admins only)", move |ctx, msg| {
            quit(admins.clone(), ctx, msg)
        });

    let listing: Arc<str> = format!("list / help, {}", builder.names().join(", ")).into();
    let help = move |ctx: BotContext, msg: ParsedMessage| list(listing.clone(), ctx, msg);
    Ok(builder
        .bot("list", "list commands", help.clone())
        .bot("help", "list commands", help)
        .build())
}

async fn list(listing: Arc<str>, ctx: BotContext, msg: ParsedMessage) -> Result<()> {
    output::say(&ctx, msg.reply_target(), &listing).await
}

fn is_admin(admins: &[String], nick: &str) -> bool {
    admins.iter().any(|a| a.eq_ignore_ascii_case(nick))
}

/// Disconnect, if the requester is an admin identified with NickServ.
async fn quit(admins: Arc<[String]>, ctx: BotContext, msg: ParsedMessage) -> Result<()> {
    if !is_admin(&admins, &msg.sender) {
        tracing::warn!(nick = %msg.sender, "Refusing quit from non-admin");
        return Ok(());
    }
    if !ctx.is_registered_user(&msg.sender).await? {
        tracing::warn!(nick = %msg.sender, "Refusing quit from unidentified admin");
        ctx.notice(&msg.sender, "Identify with NickServ first")?;
        return Ok(());
    }
    let message = if msg.params.is_empty() { "Bye" } else { msg.params.as_str() };
    tracing::info!(nick = %msg.sender, "Quit requested");
    ctx.quit(message)?;
    Ok(())
}
