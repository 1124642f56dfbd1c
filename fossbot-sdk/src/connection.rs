//! Connection state: identity, channel membership and the session state
//! machine.
//!
//! ```text
//! Connecting ──register()──▶ Registering ──376/422──▶ Joined
//!      │                        │  ▲                     │
//!      │                        └──┘ 433: nick += "_"    │
//!      └────────────────────────┴────────────────────────┴──▶ Disconnected
//! ```
//!
//! Channels passed to [`Connection::join`] before the end of the welcome
//! banner are only recorded; the server rejects joins sent before
//! registration completes. They are all joined, in order, when the banner
//! ends.

use std::sync::Arc;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::auth::{self, AuthBridge, NICKSERV};
use crate::client::ConnectConfig;
use crate::dispatch::BotContext;
use crate::error::{JoinError, SessionError};
use crate::framer::{Frame, LineFramer, NonBlockingRead};
use crate::message::{self, ParsedMessage};
use crate::outbound::{Outbound, SendError};

/// Upper bound on tracked channels.
pub const MAX_CHANNELS: usize = 10;

/// Wait before rejoining a channel we were kicked from.
pub const KICK_REJOIN_DELAY: Duration = Duration::from_secs(4);

pub const RPL_ENDOFMOTD: u16 = 376;
pub const ERR_NOMOTD: u16 = 422;
pub const ERR_NICKNAMEINUSE: u16 = 433;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Socket open, nothing sent yet.
    Connecting,
    /// NICK/USER sent, waiting for the end of the welcome banner.
    Registering,
    /// Registered; channel joins go out immediately.
    Joined,
    Disconnected,
}

/// Result of [`Connection::read_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Message(ParsedMessage),
    /// Nothing complete to process; wait for the next readiness event.
    WouldBlock,
    /// Stream ended. Fatal for the session.
    Closed,
}

pub struct Connection {
    outbound: Outbound,
    auth: Arc<AuthBridge>,
    framer: LineFramer,
    address: String,
    port: u16,
    nick: String,
    user: String,
    channels: Vec<String>,
    state: SessionState,
    nick_password: Option<Zeroizing<String>>,
    bot_version: String,
    rejoin_delay: Duration,
}

impl Connection {
    pub fn new(config: &ConnectConfig, outbound: Outbound) -> Self {
        Self {
            outbound,
            auth: Arc::new(AuthBridge::new(config.auth_timeout)),
            framer: LineFramer::new(),
            address: config.address.clone(),
            port: config.port,
            nick: config.nick.clone(),
            user: config.user.clone(),
            channels: Vec::with_capacity(MAX_CHANNELS),
            state: SessionState::Connecting,
            nick_password: config
                .nick_password
                .as_deref()
                .filter(|p| !p.is_empty())
                .map(|p| Zeroizing::new(p.to_string())),
            bot_version: config.bot_version.clone(),
            rejoin_delay: config.rejoin_delay,
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Tracked channels, in membership order.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn default_channel(&self) -> Option<&str> {
        self.channels.first().map(String::as_str)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_registered(&self) -> bool {
        self.state == SessionState::Joined
    }

    pub fn bot_version(&self) -> &str {
        &self.bot_version
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    pub fn auth(&self) -> &Arc<AuthBridge> {
        &self.auth
    }

    /// Snapshot handed to an isolated bot command. Shares only the send
    /// path and the auth bridge with this connection.
    pub fn context(&self) -> BotContext {
        BotContext::new(self.outbound.clone(), self.auth.clone(), self.nick.clone())
    }

    // ── Registration ─────────────────────────────────────────────

    /// Send NICK and USER. `Connecting → Registering`.
    pub fn register(&mut self) -> Result<(), SessionError> {
        if self.nick.is_empty() || self.user.is_empty() {
            return Err(SessionError::EmptyIdentity);
        }
        tracing::info!(nick = %self.nick, user = %self.user, server = %self.address, "Registering");
        self.outbound.nick(&self.nick)?;
        self.outbound.user(&self.user)?;
        self.state = SessionState::Registering;
        Ok(())
    }

    pub fn set_nick(&mut self, nick: &str) -> Result<(), SessionError> {
        if nick.is_empty() {
            return Err(SessionError::EmptyIdentity);
        }
        self.nick = nick.to_string();
        self.outbound.nick(&self.nick)?;
        Ok(())
    }

    // ── Channel membership ───────────────────────────────────────

    /// Record `channel` and, once registered, join it right away.
    pub fn join(&mut self, channel: &str) -> Result<(), JoinError> {
        if !channel.starts_with('#') || channel.len() < 2 || channel.contains(' ') {
            return Err(JoinError::InvalidName(channel.to_string()));
        }
        if !self.channels.iter().any(|c| c == channel) {
            if self.channels.len() >= MAX_CHANNELS {
                tracing::warn!(channel, limit = MAX_CHANNELS, "Channel limit reached");
                return Err(JoinError::ChannelLimit(MAX_CHANNELS));
            }
            self.channels.push(channel.to_string());
        }
        if self.state == SessionState::Joined {
            self.outbound.join(channel)?;
        }
        Ok(())
    }

    fn join_recorded(&self) -> Result<(), SendError> {
        for channel in &self.channels {
            self.outbound.join(channel)?;
        }
        tracing::info!(count = self.channels.len(), "Joining recorded channels");
        Ok(())
    }

    // ── Reading ──────────────────────────────────────────────────

    /// Next message from `src`. Keep-alive probes are answered here and
    /// malformed lines are skipped; neither surfaces to the caller.
    pub fn read_message<R>(&mut self, src: &mut R) -> Result<ReadOutcome, SessionError>
    where
        R: NonBlockingRead + ?Sized,
    {
        loop {
            let line = match self.framer.next_line(src)? {
                Frame::Line(line) => line,
                Frame::WouldBlock => return Ok(ReadOutcome::WouldBlock),
                Frame::Closed => {
                    self.state = SessionState::Disconnected;
                    return Ok(ReadOutcome::Closed);
                }
            };
            tracing::debug!("<- {line}");

            if let Some(token) = message::ping_token(&line) {
                self.outbound.pong(token)?;
                continue;
            }
            if let Some(msg) = ParsedMessage::parse(&line) {
                return Ok(ReadOutcome::Message(msg));
            }
        }
    }

    // ── Protocol events ──────────────────────────────────────────

    pub fn on_numeric(&mut self, code: u16) -> Result<(), SessionError> {
        match code {
            ERR_NICKNAMEINUSE => {
                self.nick.push('_');
                tracing::info!(nick = %self.nick, "Nickname in use, retrying");
                self.outbound.nick(&self.nick)?;
            }
            RPL_ENDOFMOTD | ERR_NOMOTD if self.state != SessionState::Joined => {
                self.state = SessionState::Joined;
                tracing::info!(nick = %self.nick, "Registered");
                self.join_recorded()?;
            }
            _ => {}
        }
        Ok(())
    }

    /// NickServ notices: `ACC` replies feed the auth bridge, and the
    /// "nickname is registered" prompt is answered with the password once.
    pub fn on_notice(&mut self, msg: &ParsedMessage) -> Result<(), SessionError> {
        if msg.sender_nick() != Some(NICKSERV) {
            return Ok(());
        }
        let Some((_, text)) = message::split_notice(&msg.params) else {
            return Ok(());
        };

        if let Some((nick, level)) = auth::parse_acc_reply(text) {
            self.auth.resolve(nick, level);
        } else if text.starts_with("This nickname is registered") {
            // Dropping the taken password wipes it.
            if let Some(password) = self.nick_password.take() {
                tracing::info!("Identifying to {NICKSERV}");
                self.outbound.identify(&password)?;
            }
        }
        Ok(())
    }

    /// Forced removal: forget the channel, wait out the cooldown, join it
    /// again and tell the kicker off. Kicks of other users are ignored.
    pub async fn on_kick(&mut self, msg: &ParsedMessage) -> Result<(), SessionError> {
        let Some(kicker) = msg.sender_nick() else {
            return Ok(());
        };
        let Some((channel, victim)) = message::split_kick(&msg.params) else {
            return Ok(());
        };
        if victim != self.nick {
            return Ok(());
        }

        match self.channels.iter().position(|c| c == channel) {
            Some(idx) => {
                self.channels.swap_remove(idx);
            }
            None => tracing::warn!(channel, "Kicked from a channel we were not tracking"),
        }
        tracing::warn!(channel, by = kicker, "Kicked, rejoining in {:?}", self.rejoin_delay);
        tokio::time::sleep(self.rejoin_delay).await;

        match self.join(channel) {
            Ok(()) => {}
            Err(JoinError::Transport(e)) => return Err(e.into()),
            Err(e) => {
                tracing::warn!(channel, error = %e, "Could not rejoin");
                return Ok(());
            }
        }
        self.outbound.privmsg(channel, &format!("{kicker} magkas..."))?;
        Ok(())
    }

    // ── Teardown ─────────────────────────────────────────────────

    pub fn quit(&mut self, message: &str) -> Result<(), SessionError> {
        tracing::info!(message, "Quitting");
        self.state = SessionState::Disconnected;
        self.outbound.quit(message)?;
        Ok(())
    }

    pub fn mark_disconnected(&mut self) {
        self.state = SessionState::Disconnected;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("nick", &self.nick)
            .field("user", &self.user)
            .field("channels", &self.channels)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
