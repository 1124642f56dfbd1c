//! Outbound send path.
//!
//! Every component that talks to the server (the read loop, protocol
//! handlers, bot command tasks) holds a clone of [`Outbound`]. Lines go
//! through one unbounded channel to a single writer task, so writes from
//! different tasks never interleave within a line and keep their order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use zeroize::Zeroize;

use crate::error::SessionError;
use crate::message::MAX_LINE_LEN;

/// The writer task has stopped; the connection is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("outbound channel closed")]
pub struct SendError;

/// A fully formatted line (with `\r\n`) queued for the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundLine {
    pub text: String,
    /// Never logged (carries a password); wiped once written.
    pub secret: bool,
}

/// Cloneable handle to the connection's send path.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<OutboundLine>,
    quit_sent: Arc<AtomicBool>,
}

impl Outbound {
    /// Create a send handle and the receiving end for [`run_writer`].
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundLine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let quit_sent = Arc::new(AtomicBool::new(false));
        (Self { tx, quit_sent }, rx)
    }

    /// Send `VERB target :message` (or `VERB target` without a message).
    pub fn command(&self, verb: &str, target: &str, message: Option<&str>) -> Result<(), SendError> {
        self.push(format_line(verb, target, message), false)
    }

    pub fn privmsg(&self, target: &str, text: &str) -> Result<(), SendError> {
        self.command("PRIVMSG", target, Some(text))
    }

    pub fn notice(&self, target: &str, text: &str) -> Result<(), SendError> {
        self.command("NOTICE", target, Some(text))
    }

    /// `PRIVMSG NickServ :identify <password>`, built in a single buffer
    /// that the writer wipes after sending. Never logged.
    pub fn identify(&self, password: &str) -> Result<(), SendError> {
        const PREFIX: &str = "PRIVMSG NickServ :identify ";
        let mut line = String::with_capacity(PREFIX.len() + password.len() + 2);
        line.push_str(PREFIX);
        line.push_str(password);
        line.push_str("\r\n");
        self.push(line, true)
    }

    pub fn join(&self, channel: &str) -> Result<(), SendError> {
        self.command("JOIN", channel, None)
    }

    pub fn nick(&self, nick: &str) -> Result<(), SendError> {
        self.command("NICK", nick, None)
    }

    pub fn user(&self, user: &str) -> Result<(), SendError> {
        self.command("USER", &format!("{user} 0 * :{user}"), None)
    }

    pub fn pong(&self, token: &str) -> Result<(), SendError> {
        self.command("PONG", token, None)
    }

    /// Queue `QUIT`. Any clone can do this; [`Outbound::quit_sent`] then
    /// reports it on every clone.
    pub fn quit(&self, message: &str) -> Result<(), SendError> {
        self.command("QUIT", "", Some(message))?;
        self.quit_sent.store(true, Ordering::Release);
        Ok(())
    }

    /// Whether a `QUIT` has been queued, so a server close is expected.
    pub fn quit_sent(&self) -> bool {
        self.quit_sent.load(Ordering::Acquire)
    }

    /// Whether the writer task has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn push(&self, text: String, secret: bool) -> Result<(), SendError> {
        self.tx.send(OutboundLine { text, secret }).map_err(|_| SendError)
    }
}

/// Build one wire line. Embedded line breaks are flattened and the line is
/// truncated (at a char boundary) so that it fits [`MAX_LINE_LEN`] with
/// its `\r\n`.
pub fn format_line(verb: &str, target: &str, message: Option<&str>) -> String {
    let mut line = match (target, message) {
        ("", Some(m)) => format!("{verb} :{m}"),
        (t, Some(m)) if !m.is_empty() => format!("{verb} {t} :{m}"),
        (t, _) => format!("{verb} {t}"),
    };
    if line.contains(['\r', '\n']) {
        line = line.replace(['\r', '\n'], " ");
    }

    let max = MAX_LINE_LEN - 2;
    if line.len() > max {
        let mut cut = max;
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        line.truncate(cut);
    }
    line.push_str("\r\n");
    line
}

/// Drain queued lines into the socket until every [`Outbound`] is dropped
/// or a write fails. Dropping the receiver on failure makes all further
/// sends return [`SendError`].
pub async fn run_writer<W>(
    mut rx: mpsc::UnboundedReceiver<OutboundLine>,
    mut writer: W,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(mut line) = rx.recv().await {
        if line.secret {
            tracing::debug!("-> (redacted, {} bytes)", line.text.len());
        } else {
            tracing::debug!("-> {}", line.text.trim_end());
        }
        let written = writer.write_all(line.text.as_bytes()).await;
        if line.secret {
            line.text.zeroize();
        }
        if let Err(e) = written {
            tracing::error!(error = %e, "Failed to send message");
            return Err(e.into());
        }
    }
    writer.flush().await?;
    Ok(())
}
