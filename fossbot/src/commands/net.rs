//! Network diagnostics: `!ping`, `!traceroute`, `!dns`.
//!
//! Each runs a system tool directly (no shell) and relays its output
//! line by line.

use std::time::Duration;

use anyhow::{Context, Result};
use fossbot_sdk::dispatch::BotContext;
use fossbot_sdk::message::ParsedMessage;
use tokio::process::Command;

use crate::output;

pub const DEFAULT_PING_COUNT: u32 = 3;
pub const MAX_PING_COUNT: u32 = 10;
pub const MAX_HOPS: u32 = 20;

/// Wall-clock limit for one tool run.
const TOOL_TIMEOUT: Duration = Duration::from_secs(45);
/// Output beyond this many lines is dropped.
const MAX_OUTPUT_LINES: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

/// Guess the address family from the host argument: any `.` means IPv4
/// or a host name, otherwise a `:` means IPv6. Rejects anything that
/// could be taken for an option or carries odd characters.
pub fn family(host: &str) -> Option<Family> {
    if host.starts_with('-')
        || !host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '-'))
    {
        return None;
    }
    if host.contains('.') {
        Some(Family::V4)
    } else if host.contains(':') {
        Some(Family::V6)
    } else {
        None
    }
}

/// An external command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub program: &'static str,
    pub args: Vec<String>,
}

/// `host [count]` → `ping -c count host` (or `ping6`).
pub fn ping_call(args: &[&str]) -> Option<ToolCall> {
    let (host, count) = match args {
        [host] => (*host, DEFAULT_PING_COUNT),
        [host, count] => {
            let count = count
                .parse::<i64>()
                .unwrap_or(i64::from(DEFAULT_PING_COUNT))
                .clamp(1, i64::from(MAX_PING_COUNT));
            (*host, u32::try_from(count).ok()?)
        }
        _ => return None,
    };
    let program = match family(host)? {
        Family::V4 => "ping",
        Family::V6 => "ping6",
    };
    Some(ToolCall {
        program,
        args: vec!["-c".into(), count.to_string(), host.into()],
    })
}

pub fn traceroute_call(args: &[&str]) -> Option<ToolCall> {
    let [host] = args else {
        return None;
    };
    let program = match family(host)? {
        Family::V4 => "traceroute",
        Family::V6 => "traceroute6",
    };
    Some(ToolCall {
        program,
        args: vec!["-m".into(), MAX_HOPS.to_string(), (*host).into()],
    })
}

pub fn dns_call(args: &[&str]) -> Option<ToolCall> {
    match args {
        [host] if family(host) == Some(Family::V4) => Some(ToolCall {
            program: "nslookup",
            args: vec![(*host).into()],
        }),
        _ => None,
    }
}

/// Run the tool and collect stdout then stderr.
pub async fn run_tool(call: &ToolCall) -> Result<String> {
    tracing::debug!(program = call.program, args = ?call.args, "Running tool");
    let output = tokio::time::timeout(
        TOOL_TIMEOUT,
        Command::new(call.program)
            .args(&call.args)
            .kill_on_drop(true)
            .output(),
    )
    .await
    .context("Command timed out")?
    .with_context(|| format!("Failed to execute {}", call.program))?;

    let mut result = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str(&stderr);
    }
    if !output.status.success() {
        tracing::debug!(program = call.program, status = %output.status, "Tool exited with failure");
    }
    Ok(result)
}

async fn relay(ctx: &BotContext, target: &str, call: &ToolCall) -> Result<()> {
    let text = run_tool(call).await?;
    let lines: Vec<String> = text
        .lines()
        .take(MAX_OUTPUT_LINES)
        .flat_map(|l| output::wrap_lines(l, output::MAX_REPLY_LEN))
        .collect();
    output::say_lines(ctx, target, lines, output::LINE_DELAY).await
}

pub async fn ping(ctx: BotContext, msg: ParsedMessage) -> Result<()> {
    let Some(call) = ping_call(&msg.args()) else {
        return Ok(());
    };
    relay(&ctx, msg.reply_target(), &call).await
}

/// Results go to the requester privately; a channel request gets a note.
pub async fn traceroute(ctx: BotContext, msg: ParsedMessage) -> Result<()> {
    let Some(call) = traceroute_call(&msg.args()) else {
        return Ok(());
    };
    if msg.reply_target().contains('#') {
        ctx.say(msg.reply_target(), &format!("Printing results privately to {}", msg.sender))?;
    }
    relay(&ctx, &msg.sender, &call).await
}

pub async fn dns(ctx: BotContext, msg: ParsedMessage) -> Result<()> {
    let Some(call) = dns_call(&msg.args()) else {
        return Ok(());
    };
    relay(&ctx, msg.reply_target(), &call).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_from_separator() {
        assert_eq!(family("8.8.8.8"), Some(Family::V4));
        assert_eq!(family("example.org"), Some(Family::V4));
        assert_eq!(family("2001:db8::1"), Some(Family::V6));
        assert_eq!(family("localhost"), None);
        assert_eq!(family("-f.example.org"), None);
        assert_eq!(family("a.org;reboot"), None);
    }

    #[test]
    fn ping_count_is_clamped() {
        let count = |args: &[&str]| ping_call(args).map(|c| c.args[1].clone());
        assert_eq!(count(&["example.org"]).as_deref(), Some("3"));
        assert_eq!(count(&["example.org", "7"]).as_deref(), Some("7"));
        assert_eq!(count(&["example.org", "500"]).as_deref(), Some("10"));
        assert_eq!(count(&["example.org", "-1"]).as_deref(), Some("1"));
        assert_eq!(count(&["example.org", "x"]).as_deref(), Some("3"));
    }

    #[test]
    fn ping_picks_program_by_family() {
        assert_eq!(
            ping_call(&["::1"]),
            Some(ToolCall {
                program: "ping6",
                args: vec!["-c".into(), "3".into(), "::1".into()],
            })
        );
        assert_eq!(ping_call(&["nohost"]), None);
        assert_eq!(ping_call(&[]), None);
    }

    #[test]
    fn traceroute_limits_hops() {
        let call = traceroute_call(&["example.org"]).unwrap();
        assert_eq!(call.program, "traceroute");
        assert_eq!(call.args, vec!["-m", "20", "example.org"]);
        assert_eq!(traceroute_call(&["2001:db8::1"]).unwrap().program, "traceroute6");
        assert_eq!(traceroute_call(&["a.org", "b.org"]), None);
    }

    #[test]
    fn dns_needs_a_dotted_name() {
        assert_eq!(dns_call(&["example.org"]).unwrap().args, vec!["example.org"]);
        assert_eq!(dns_call(&["::1"]), None);
        assert_eq!(dns_call(&["example"]), None);
    }
}
