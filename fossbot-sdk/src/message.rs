//! Parsed IRC lines.
//!
//! The framer only splits a line into three parts:
//!
//! ```text
//! :sender COMMAND remainder...
//! ```
//!
//! The remainder stays opaque. Verb-specific tokenization (destination vs
//! body, kick victim, etc.) happens in the handler for that verb, through
//! the helpers at the bottom of this module.

/// Maximum protocol line length, including the trailing `\r\n`.
pub const MAX_LINE_LEN: usize = 512;

/// One framed line from the server.
///
/// For bot commands the dispatcher builds a second `ParsedMessage` where
/// `sender` is the requesting nick, `command` the bot command name,
/// `params` its arguments and `target` the place to reply to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    /// `nick!user@host` or a server name, without the leading `:`.
    pub sender: String,
    /// Verb (`PRIVMSG`, `KICK`, ...) or three-digit numeric reply.
    pub command: String,
    /// Everything after the command, untouched.
    pub params: String,
    /// Channel or nick to reply to. Only set by event-specific handling.
    pub target: Option<String>,
}

impl ParsedMessage {
    /// Parse a line (without its terminator). Returns `None` for lines
    /// missing the sender marker, the command or the remainder.
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix(':')?;
        let mut parts = rest.splitn(3, ' ');
        let sender = parts.next().filter(|s| !s.is_empty())?;
        let command = parts.next().filter(|s| !s.is_empty())?;
        let params = parts.next().filter(|s| !s.is_empty())?;

        Some(Self {
            sender: sender.to_string(),
            command: command.to_string(),
            params: params.to_string(),
            target: None,
        })
    }

    /// The numeric reply code, if the command is three ASCII digits.
    pub fn numeric(&self) -> Option<u16> {
        if self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit()) {
            self.command.parse().ok()
        } else {
            None
        }
    }

    /// Sender with the `!user@host` part discarded. `None` when the
    /// sender is not a user (a server name has no `!`).
    pub fn sender_nick(&self) -> Option<&str> {
        self.sender
            .split_once('!')
            .map(|(nick, _)| nick)
            .filter(|nick| !nick.is_empty())
    }

    /// Reply destination, falling back to the sender.
    pub fn reply_target(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.sender)
    }

    /// Arguments split on whitespace.
    pub fn args(&self) -> Vec<&str> {
        self.params.split_whitespace().collect()
    }
}

/// The token of a server keep-alive probe (`PING :token`), or `None` if
/// the line is not a probe.
pub fn ping_token(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("PING")?;
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    let rest = rest.trim_start();
    Some(rest.strip_prefix(':').unwrap_or(rest))
}

/// The remainder of a PRIVMSG: `#chan :!cmd some args`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatLine<'a> {
    /// Channel or our own nick (private message).
    pub destination: &'a str,
    /// First word of the body, leading `:` removed.
    pub head: &'a str,
    /// Rest of the body, if any.
    pub rest: Option<&'a str>,
}

impl<'a> ChatLine<'a> {
    pub fn parse(params: &'a str) -> Option<Self> {
        let (destination, body) = params.split_once(' ')?;
        let body = body.strip_prefix(':').unwrap_or(body);
        if destination.is_empty() || body.is_empty() {
            return None;
        }
        let (head, rest) = match body.split_once(' ') {
            Some((head, rest)) => (head, Some(rest).filter(|r| !r.is_empty())),
            None => (body, None),
        };
        Some(Self { destination, head, rest })
    }

    /// Whether the line was sent to a channel rather than privately.
    pub fn is_channel(&self) -> bool {
        self.destination.contains('#')
    }
}

/// The remainder of a NOTICE: `(destination, text)` with the leading
/// `:` of the text removed.
pub fn split_notice(params: &str) -> Option<(&str, &str)> {
    let (destination, text) = params.split_once(' ')?;
    let text = text.strip_prefix(':').unwrap_or(text);
    if text.is_empty() {
        return None;
    }
    Some((destination, text))
}

/// The remainder of a KICK: `#chan victim :reason` → `(channel, victim)`.
pub fn split_kick(params: &str) -> Option<(&str, &str)> {
    let mut words = params.split(' ');
    let channel = words.next().filter(|c| !c.is_empty())?;
    let victim = words.next().filter(|v| !v.is_empty())?;
    Some((channel, victim))
}
