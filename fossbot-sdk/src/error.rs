//! Error types for the session engine.

use std::time::Duration;

use crate::outbound::SendError;

/// Fatal session errors. Any of these ends the connection.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("connection closed by server")]
    Closed,
    #[error("failed to send message: outbound writer is gone")]
    SendFailed,
    #[error("invalid server address {address}:{port}")]
    InvalidAddress { address: String, port: u16 },
    #[error("nickname and username must not be empty")]
    EmptyIdentity,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<SendError> for SessionError {
    fn from(_: SendError) -> Self {
        SessionError::SendFailed
    }
}

/// A rejected `join` request. Only `Transport` is fatal for the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("channel limit reached ({0})")]
    ChannelLimit(usize),
    #[error("channel name must start with '#': {0:?}")]
    InvalidName(String),
    #[error(transparent)]
    Transport(#[from] SendError),
}

/// A bot command that could not be handed to a worker task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("no async runtime available to run command {0:?}")]
    NoRuntime(String),
    #[error("all command workers are busy, dropping {0:?}")]
    Saturated(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Only one NickServ query may be outstanding per connection.
    #[error("another identity query is already in flight")]
    Busy,
    #[error("no reply from NickServ within {0:?}")]
    Timeout(Duration),
    #[error("identity query abandoned before a reply arrived")]
    Closed,
    #[error(transparent)]
    Transport(#[from] SendError),
}
