//! Message dispatch.
//!
//! Numeric replies go to the connection state machine. PRIVMSG, NOTICE
//! and KICK run inline in the read loop because they touch connection
//! state. Bot commands (`!name args` inside a PRIVMSG) run in their own
//! tokio task with nothing but a [`BotContext`]: a slow or crashing
//! command never stalls the read loop or corrupts connection state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::Semaphore;

use crate::auth::AuthBridge;
use crate::command::{CommandTable, CommandTableBuilder};
use crate::connection::Connection;
use crate::error::{AuthError, DispatchError, SessionError};
use crate::message::{ChatLine, ParsedMessage};
use crate::outbound::{Outbound, SendError};

/// Leading character of a bot command.
pub const COMMAND_PREFIX: char = '!';

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_WORKERS: usize = 16;

/// Built-in handlers for protocol verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolHandler {
    Privmsg,
    Notice,
    Kick,
}

impl CommandTable<ProtocolHandler> {
    pub fn protocol() -> Self {
        CommandTable::builder()
            .command("PRIVMSG", "user and channel messages", ProtocolHandler::Privmsg)
            .command("NOTICE", "notices (NickServ replies)", ProtocolHandler::Notice)
            .command("KICK", "forced channel removal", ProtocolHandler::Kick)
            .build()
    }
}

// ── Bot commands ─────────────────────────────────────────────────

/// What a bot command gets instead of the connection: the send path, the
/// auth bridge, and our nick at spawn time.
#[derive(Clone)]
pub struct BotContext {
    outbound: Outbound,
    auth: Arc<AuthBridge>,
    nick: String,
}

impl BotContext {
    pub fn new(outbound: Outbound, auth: Arc<AuthBridge>, nick: String) -> Self {
        Self { outbound, auth, nick }
    }

    pub fn say(&self, target: &str, text: &str) -> Result<(), SendError> {
        self.outbound.privmsg(target, text)
    }

    pub fn notice(&self, target: &str, text: &str) -> Result<(), SendError> {
        self.outbound.notice(target, text)
    }

    pub fn quit(&self, message: &str) -> Result<(), SendError> {
        self.outbound.quit(message)
    }

    pub fn bot_nick(&self) -> &str {
        &self.nick
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Whether NickServ reports `nick` as identified. See [`AuthBridge`].
    pub async fn is_registered_user(&self, nick: &str) -> Result<bool, AuthError> {
        self.auth.is_registered_user(&self.outbound, nick).await
    }
}

impl std::fmt::Debug for BotContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotContext").field("nick", &self.nick).finish_non_exhaustive()
    }
}

/// A bot command capability. Implemented for any
/// `Fn(BotContext, ParsedMessage) -> impl Future<Output = anyhow::Result<()>>`.
pub trait BotCommand: Send + Sync {
    fn call(&self, ctx: BotContext, msg: ParsedMessage) -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<F, Fut> BotCommand for F
where
    F: Fn(BotContext, ParsedMessage) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn call(&self, ctx: BotContext, msg: ParsedMessage) -> BoxFuture<'static, anyhow::Result<()>> {
        (self)(ctx, msg).boxed()
    }
}

pub type BotCommands = CommandTable<Arc<dyn BotCommand>>;

impl CommandTableBuilder<Arc<dyn BotCommand>> {
    /// Register an async fn or closure as a bot command.
    pub fn bot<F, Fut>(self, name: &str, description: &str, f: F) -> Self
    where
        F: Fn(BotContext, ParsedMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.command(name, description, Arc::new(f))
    }
}

// ── Dispatcher ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// Upper bound on a single bot command's run time.
    pub command_timeout: Duration,
    /// Bot commands allowed to run at once.
    pub max_workers: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

pub struct Dispatcher {
    protocol: CommandTable<ProtocolHandler>,
    commands: Arc<BotCommands>,
    workers: Arc<Semaphore>,
    command_timeout: Duration,
}

impl Dispatcher {
    pub fn new(commands: Arc<BotCommands>, config: DispatchConfig) -> Self {
        Self {
            protocol: CommandTable::protocol(),
            commands,
            workers: Arc::new(Semaphore::new(config.max_workers.max(1))),
            command_timeout: config.command_timeout,
        }
    }

    /// Route one message. Only transport failures are returned; everything
    /// else is handled or dropped here.
    pub async fn dispatch(&self, conn: &mut Connection, msg: ParsedMessage) -> Result<(), SessionError> {
        if let Some(code) = msg.numeric() {
            return conn.on_numeric(code);
        }
        match self.protocol.lookup(&msg.command) {
            Some(ProtocolHandler::Privmsg) => self.on_privmsg(conn, &msg),
            Some(ProtocolHandler::Notice) => conn.on_notice(&msg),
            Some(ProtocolHandler::Kick) => conn.on_kick(&msg).await,
            None => Ok(()),
        }
    }

    fn on_privmsg(&self, conn: &Connection, msg: &ParsedMessage) -> Result<(), SessionError> {
        let Some(nick) = msg.sender_nick() else {
            return Ok(());
        };
        let Some(line) = ChatLine::parse(&msg.params) else {
            return Ok(());
        };
        // Private messages are answered privately.
        let reply_to = if line.is_channel() { line.destination } else { nick };

        if let Some(name) = line.head.strip_prefix(COMMAND_PREFIX) {
            let Some(command) = self.commands.lookup(name) else {
                return Ok(());
            };
            let request = ParsedMessage {
                sender: nick.to_string(),
                command: name.to_string(),
                params: line.rest.unwrap_or_default().to_string(),
                target: Some(reply_to.to_string()),
            };
            tracing::info!(command = name, from = nick, target = reply_to, "Bot command");
            if let Err(e) = self.spawn(command.clone(), conn.context(), request) {
                tracing::warn!(error = %e, "Bot command dropped");
            }
        } else if let Some(ctcp) = line.head.strip_prefix('\x01') {
            if ctcp.starts_with("VERSION") {
                conn.outbound()
                    .notice(nick, &format!("\x01VERSION {}\x01", conn.bot_version()))?;
            }
        }
        Ok(())
    }

    /// Run `command` in its own task under the per-command timeout. The
    /// caller never waits for it.
    pub fn spawn(
        &self,
        command: Arc<dyn BotCommand>,
        ctx: BotContext,
        msg: ParsedMessage,
    ) -> Result<(), DispatchError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| DispatchError::NoRuntime(msg.command.clone()))?;
        let permit = self
            .workers
            .clone()
            .try_acquire_owned()
            .map_err(|_| DispatchError::Saturated(msg.command.clone()))?;

        let timeout = self.command_timeout;
        let name = msg.command.clone();
        runtime.spawn(async move {
            let _permit = permit;
            match tokio::time::timeout(timeout, command.call(ctx, msg)).await {
                Ok(Ok(())) => tracing::debug!(command = %name, "Bot command finished"),
                Ok(Err(e)) => tracing::warn!(command = %name, error = %e, "Bot command failed"),
                Err(_) => tracing::warn!(command = %name, ?timeout, "Bot command timed out"),
            }
        });
        Ok(())
    }

    /// Free worker slots.
    pub fn idle_workers(&self) -> usize {
        self.workers.available_permits()
    }
}
