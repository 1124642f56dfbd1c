//! Reply formatting for IRC channels.
//!
//! Long or multi-line output is split into lines that fit a PRIVMSG and
//! sent with a small delay between lines to stay under flood limits.

use std::time::Duration;

use fossbot_sdk::dispatch::BotContext;

/// Longest text we put in one PRIVMSG.
pub const MAX_REPLY_LEN: usize = 400;

/// Delay between consecutive lines of one reply.
pub const LINE_DELAY: Duration = Duration::from_millis(100);

/// mIRC color codes.
pub mod color {
    pub const RESET: &str = "\x0f";
    pub const RED: &str = "\x0304";
    pub const BLUE: &str = "\x0312";
    pub const PURPLE: &str = "\x0306";
    pub const ORANGE: &str = "\x0307";
    pub const LTGREEN: &str = "\x0309";
    pub const TEAL: &str = "\x0310";
    pub const LTCYAN: &str = "\x0311";
    pub const PINK: &str = "\x0313";
}

/// Post `text` to `target`, wrapped and paced.
pub async fn say(ctx: &BotContext, target: &str, text: &str) -> anyhow::Result<()> {
    say_lines(ctx, target, wrap_lines(text, MAX_REPLY_LEN), LINE_DELAY).await
}

/// Post each line separately, waiting `delay` between them. Blank lines
/// are skipped.
pub async fn say_lines<I, S>(ctx: &BotContext, target: &str, lines: I, delay: Duration) -> anyhow::Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut first = true;
    for line in lines {
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }
        if !first {
            tokio::time::sleep(delay).await;
        }
        first = false;
        ctx.say(target, line)?;
    }
    Ok(())
}

/// Wrap text into lines of at most `max_len` bytes, breaking on word
/// boundaries. A single word longer than `max_len` gets its own line.
pub fn wrap_lines(text: &str, max_len: usize) -> Vec<String> {
    let mut result = Vec::new();
    for line in text.lines() {
        if line.len() <= max_len {
            result.push(line.to_string());
            continue;
        }
        let mut current = String::new();
        for word in line.split_whitespace() {
            if !current.is_empty() && current.len() + word.len() + 1 > max_len {
                result.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            result.push(current);
        }
    }
    result
}
