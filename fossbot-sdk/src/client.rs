//! Session driver: connects, registers, and runs the read loop.
//!
//! One task owns the [`Connection`]. It sleeps until the socket is
//! readable, drains every complete line with non-blocking reads, and
//! dispatches each message in framing order. Outbound lines go through a
//! separate writer task.
//!
//! ## Reconnection
//!
//! The session ends on the first transport error. Reconnecting (with a
//! backoff) is up to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::task::JoinHandle;

use crate::auth::DEFAULT_AUTH_TIMEOUT;
use crate::connection::{Connection, KICK_REJOIN_DELAY, ReadOutcome};
use crate::dispatch::{
    BotCommands, DEFAULT_COMMAND_TIMEOUT, DEFAULT_MAX_WORKERS, DispatchConfig, Dispatcher,
};
use crate::error::SessionError;
use crate::outbound::{Outbound, run_writer};

/// How long the writer gets to flush a final QUIT.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for one bot session.
#[derive(Clone)]
pub struct ConnectConfig {
    /// Server host name or IP.
    pub address: String,
    pub port: u16,
    pub nick: String,
    /// Username (ident). Also sent as the real name.
    pub user: String,
    /// Channels joined once registration completes.
    pub channels: Vec<String>,
    /// NickServ password, sent once when NickServ asks for it.
    pub nick_password: Option<String>,
    /// Answer to CTCP VERSION.
    pub bot_version: String,
    pub quit_message: String,
    pub rejoin_delay: Duration,
    pub auth_timeout: Duration,
    pub command_timeout: Duration,
    pub max_workers: usize,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            address: "chat.freenode.net".to_string(),
            port: 6667,
            nick: "fossbot".to_string(),
            user: "fossbot".to_string(),
            channels: Vec::new(),
            nick_password: None,
            bot_version: concat!("fossbot-sdk ", env!("CARGO_PKG_VERSION")).to_string(),
            quit_message: "Bye".to_string(),
            rejoin_delay: KICK_REJOIN_DELAY,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl std::fmt::Debug for ConnectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("nick", &self.nick)
            .field("user", &self.user)
            .field("channels", &self.channels)
            .field("nick_password", &self.nick_password.as_ref().map(|_| "<redacted>"))
            .field("bot_version", &self.bot_version)
            .field("quit_message", &self.quit_message)
            .field("rejoin_delay", &self.rejoin_delay)
            .field("auth_timeout", &self.auth_timeout)
            .field("command_timeout", &self.command_timeout)
            .field("max_workers", &self.max_workers)
            .finish()
    }
}

impl ConnectConfig {
    /// Reject addresses that cannot be a host name or IP, and port 0.
    pub fn validate(&self) -> Result<(), SessionError> {
        if !self.address.contains('.') || self.address.contains(' ') || self.port == 0 {
            return Err(SessionError::InvalidAddress {
                address: self.address.clone(),
                port: self.port,
            });
        }
        if self.nick.is_empty() || self.user.is_empty() {
            return Err(SessionError::EmptyIdentity);
        }
        Ok(())
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            command_timeout: self.command_timeout,
            max_workers: self.max_workers,
        }
    }
}

/// Open the TCP connection.
///
/// Done before [`run`] so that connection errors surface before anything
/// is spawned.
pub async fn connect(config: &ConnectConfig) -> Result<TcpStream, SessionError> {
    config.validate()?;
    tracing::debug!("Resolving {}:{}...", config.address, config.port);
    let stream = TcpStream::connect((config.address.as_str(), config.port)).await?;
    stream.set_nodelay(true)?;
    tracing::info!(server = %config.address, port = config.port, "Connected");
    Ok(stream)
}

enum Wake {
    Readable(std::io::Result<()>),
    Writer(Result<Result<(), SessionError>, tokio::task::JoinError>),
    Shutdown,
}

/// Run one session on `stream` until the server closes it, a transport
/// error occurs, or `shutdown` resolves (which sends QUIT and returns
/// `Ok`).
pub async fn run<F>(
    stream: TcpStream,
    config: &ConnectConfig,
    commands: Arc<BotCommands>,
    shutdown: F,
) -> Result<(), SessionError>
where
    F: Future<Output = ()>,
{
    let (mut reader, writer) = stream.into_split();
    let (outbound, rx) = Outbound::channel();
    let mut writer_task: JoinHandle<Result<(), SessionError>> = tokio::spawn(run_writer(rx, writer));

    let mut conn = Connection::new(config, outbound);
    for channel in &config.channels {
        if let Err(e) = conn.join(channel) {
            tracing::warn!(channel = %channel, error = %e, "Skipping channel");
        }
    }
    let dispatcher = Dispatcher::new(commands, config.dispatch_config());

    let result = drive(
        &mut conn,
        &mut reader,
        &mut writer_task,
        &dispatcher,
        &config.quit_message,
        shutdown,
    )
    .await;

    conn.mark_disconnected();
    match &result {
        Ok(()) => tracing::info!(nick = %conn.nick(), "Session ended"),
        Err(e) => tracing::warn!(nick = %conn.nick(), error = %e, "Session ended"),
    }

    // Bot tasks may still hold senders; don't wait on them forever.
    drop(dispatcher);
    drop(conn);
    if !writer_task.is_finished()
        && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer_task).await.is_err()
    {
        writer_task.abort();
    }
    result
}

async fn drive<F>(
    conn: &mut Connection,
    reader: &mut OwnedReadHalf,
    writer_task: &mut JoinHandle<Result<(), SessionError>>,
    dispatcher: &Dispatcher,
    quit_message: &str,
    shutdown: F,
) -> Result<(), SessionError>
where
    F: Future<Output = ()>,
{
    conn.register()?;

    let mut shutdown = std::pin::pin!(shutdown);
    loop {
        let wake = tokio::select! {
            ready = reader.readable() => Wake::Readable(ready),
            exit = &mut *writer_task => Wake::Writer(exit),
            () = &mut shutdown => Wake::Shutdown,
        };

        match wake {
            Wake::Readable(ready) => {
                ready?;
                // Drain everything buffered; readiness is edge-like.
                loop {
                    match conn.read_message(reader)? {
                        ReadOutcome::Message(msg) => dispatcher.dispatch(conn, msg).await?,
                        ReadOutcome::WouldBlock => break,
                        ReadOutcome::Closed if conn.outbound().quit_sent() => {
                            tracing::info!("Server closed the connection after QUIT");
                            return Ok(());
                        }
                        ReadOutcome::Closed => return Err(SessionError::Closed),
                    }
                }
            }
            Wake::Writer(exit) => {
                return match exit {
                    Ok(Err(e)) => Err(e),
                    Ok(Ok(())) | Err(_) => Err(SessionError::SendFailed),
                };
            }
            Wake::Shutdown => {
                conn.quit(quit_message)?;
                return Ok(());
            }
        }
    }
}
