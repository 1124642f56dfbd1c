//! HTTP-backed commands: `!url` (is.gd shortener) and `!github`.

use std::time::Duration;

use anyhow::{Context, Result};
use fossbot_sdk::dispatch::BotContext;
use fossbot_sdk::message::ParsedMessage;
use serde::Deserialize;

use crate::output::{self, color};

const SHORTENER_URL: &str = "https://is.gd/create.php";
const GITHUB_API: &str = "https://api.github.com";
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

pub const MAX_COMMITS: usize = 10;

/// Shared HTTP client for the web commands.
#[derive(Clone)]
pub struct Web {
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    sha: String,
    html_url: String,
    commit: CommitBody,
}

#[derive(Debug, Deserialize)]
struct CommitBody {
    message: String,
    author: CommitAuthor,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    name: String,
}

impl Web {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("fossbot/", env!("CARGO_PKG_VERSION")))
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("building HTTP client")?;
        Ok(Self { http })
    }

    pub async fn shorten(&self, url: &str) -> Result<String> {
        let short = self
            .http
            .get(SHORTENER_URL)
            .query(&[("format", "simple"), ("url", url)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let short = short.trim();
        anyhow::ensure!(short.starts_with("http"), "is.gd refused {url}: {short}");
        Ok(short.to_string())
    }

    async fn commits(&self, repo: &str, count: usize) -> Result<Vec<CommitEntry>> {
        let body = self
            .http
            .get(format!("{GITHUB_API}/repos/{repo}/commits"))
            .query(&[("per_page", count)])
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let mut entries: Vec<CommitEntry> =
            serde_json::from_str(&body).context("unexpected GitHub response")?;
        entries.truncate(count);
        Ok(entries)
    }
}

/// The single argument of `!url`, if it looks like a URL.
pub fn url_arg<'a>(args: &[&'a str]) -> Option<&'a str> {
    match args {
        [url] if url.contains('.') => Some(*url),
        _ => None,
    }
}

/// `user/repo [count]`, with the count clamped to `1..=MAX_COMMITS`.
pub fn github_args<'a>(args: &[&'a str]) -> Option<(&'a str, usize)> {
    let (repo, count) = match args {
        [repo] => (*repo, 1),
        [repo, count] => (*repo, count.parse::<i64>().unwrap_or(1).clamp(1, MAX_COMMITS as i64) as usize),
        _ => return None,
    };
    let (user, name) = repo.split_once('/')?;
    if user.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((repo, count))
}

fn commit_line(entry: &CommitEntry, link: &str) -> String {
    let sha: String = entry.sha.chars().take(7).collect();
    let subject = entry.commit.message.lines().next().unwrap_or_default();
    format!(
        "{}[{sha}]{} {subject}{} --{}{} - {link}",
        color::PURPLE,
        color::RESET,
        color::ORANGE,
        entry.commit.author.name,
        color::BLUE,
    )
}

pub async fn url(web: Web, ctx: BotContext, msg: ParsedMessage) -> Result<()> {
    let Some(long) = url_arg(&msg.args()) else {
        return Ok(());
    };
    let short = web.shorten(long).await?;
    ctx.say(msg.reply_target(), &short)?;
    Ok(())
}

pub async fn github(web: Web, ctx: BotContext, msg: ParsedMessage) -> Result<()> {
    let Some((repo, count)) = github_args(&msg.args()) else {
        return Ok(());
    };
    let entries = web.commits(repo, count).await?;
    let mut lines = Vec::with_capacity(entries.len());
    for entry in &entries {
        // A failed shortening still shows the commit.
        let link = match web.shorten(&entry.html_url).await {
            Ok(link) => link,
            Err(e) => {
                tracing::debug!(error = %e, "Shortening commit link failed");
                String::new()
            }
        };
        lines.push(commit_line(entry, &link));
    }
    output::say_lines(&ctx, msg.reply_target(), lines, output::LINE_DELAY).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_needs_exactly_one_dotted_argument() {
        assert_eq!(url_arg(&["https://example.org/x"]), Some("https://example.org/x"));
        assert_eq!(url_arg(&["localhost"]), None);
        assert_eq!(url_arg(&[]), None);
        assert_eq!(url_arg(&["a.org", "b.org"]), None);
    }

    #[test]
    fn github_count_is_clamped() {
        assert_eq!(github_args(&["rust-lang/rust"]), Some(("rust-lang/rust", 1)));
        assert_eq!(github_args(&["rust-lang/rust", "5"]), Some(("rust-lang/rust", 5)));
        assert_eq!(github_args(&["rust-lang/rust", "99"]), Some(("rust-lang/rust", MAX_COMMITS)));
        assert_eq!(github_args(&["rust-lang/rust", "-3"]), Some(("rust-lang/rust", 1)));
        assert_eq!(github_args(&["rust-lang/rust", "0"]), Some(("rust-lang/rust", 1)));
        assert_eq!(github_args(&["rust-lang/rust", "many"]), Some(("rust-lang/rust", 1)));
    }

    #[test]
    fn github_needs_user_slash_repo() {
        assert_eq!(github_args(&["rust"]), None);
        assert_eq!(github_args(&["/rust"]), None);
        assert_eq!(github_args(&["a/b/c"]), None);
        assert_eq!(github_args(&["a/b", "1", "2"]), None);
    }

    #[test]
    fn formats_commit_from_api_json() {
        let body = r#"[{
            "sha": "0123456789abcdef",
            "html_url": "https://github.com/a/b/commit/0123456",
            "commit": {
                "message": "Fix the thing\n\nLonger description",
                "author": { "name": "Alice", "email": "alice@example.org" }
            },
            "author": null
        }]"#;
        let entries: Vec<CommitEntry> = serde_json::from_str(body).unwrap();
        let line = commit_line(&entries[0], "https://is.gd/abc");
        assert_eq!(
            line,
            "\x0306[0123456]\x0f Fix the thing\x0307 --Alice\x0312 - https://is.gd/abc"
        );
    }
}
