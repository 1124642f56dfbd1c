//! NickServ `ACC` bridge.
//!
//! Answers "is this nick identified?" on top of the asynchronous message
//! stream: the query goes out as a normal PRIVMSG and the reply arrives
//! later as a NOTICE, which the read loop hands to [`AuthBridge::resolve`].
//!
//! Only one query may be outstanding per connection. A second concurrent
//! query fails with [`AuthError::Busy`] instead of racing for the reply.
//! Callers are bot command tasks; the read loop itself never waits here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::AuthError;
use crate::outbound::Outbound;

/// Nick of the identity service.
pub const NICKSERV: &str = "NickServ";

/// `ACC` level of a nick that is registered and identified.
pub const ACC_IDENTIFIED: i32 = 3;

pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(10);

struct PendingQuery {
    id: u64,
    nick: String,
    reply: oneshot::Sender<i32>,
}

pub struct AuthBridge {
    pending: Mutex<Option<PendingQuery>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl AuthBridge {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(None),
            next_id: AtomicU64::new(0),
            timeout,
        }
    }

    /// Ask NickServ about `nick` and wait for the correlated reply.
    /// `true` only for level 3 (identified).
    pub async fn is_registered_user(&self, outbound: &Outbound, nick: &str) -> Result<bool, AuthError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let reply = {
            let mut pending = self.pending.lock();
            if pending.is_some() {
                return Err(AuthError::Busy);
            }
            let (tx, rx) = oneshot::channel();
            *pending = Some(PendingQuery {
                id,
                nick: nick.to_string(),
                reply: tx,
            });
            rx
        };
        // Clears our own slot on every exit path, including cancellation.
        let _slot = PendingSlot { bridge: self, id };

        outbound.privmsg(NICKSERV, &format!("ACC {nick}"))?;

        let level = tokio::time::timeout(self.timeout, reply)
            .await
            .map_err(|_| AuthError::Timeout(self.timeout))?
            .map_err(|_| AuthError::Closed)?;

        tracing::debug!(nick, level, "NickServ ACC reply");
        Ok(level == ACC_IDENTIFIED)
    }

    /// Deliver an `ACC` reply. Returns whether it matched the pending
    /// query; replies for other nicks leave the query pending.
    pub fn resolve(&self, nick: &str, level: i32) -> bool {
        let mut pending = self.pending.lock();
        match pending.take() {
            Some(query) if query.nick.eq_ignore_ascii_case(nick) => {
                // The waiter may have timed out already.
                let _ = query.reply.send(level);
                true
            }
            Some(query) => {
                tracing::debug!(nick, expected = %query.nick, "Ignoring uncorrelated ACC reply");
                *pending = Some(query);
                false
            }
            None => {
                tracing::debug!(nick, "ACC reply with no query outstanding");
                false
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}

impl Default for AuthBridge {
    fn default() -> Self {
        Self::new(DEFAULT_AUTH_TIMEOUT)
    }
}

struct PendingSlot<'a> {
    bridge: &'a AuthBridge,
    id: u64,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        let mut pending = self.bridge.pending.lock();
        // A resolved query's slot may already hold the next caller's query.
        if pending.as_ref().is_some_and(|q| q.id == self.id) {
            pending.take();
        }
    }
}

/// Parse `alice ACC 3` (or Atheme's `alice -> alice ACC 3`) into
/// `("alice", 3)`.
pub fn parse_acc_reply(text: &str) -> Option<(&str, i32)> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let idx = words.iter().position(|w| *w == "ACC")?;
    if idx == 0 {
        return None;
    }
    let level = words.get(idx + 1)?.parse().ok()?;
    Some((words[0], level))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    async fn query_with_reply(level: i32) -> Result<bool, AuthError> {
        let bridge = Arc::new(AuthBridge::default());
        let (outbound, mut rx) = Outbound::channel();

        let task = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.is_registered_user(&outbound, "alice").await })
        };

        let line = rx.recv().await.unwrap();
        assert_eq!(line.text, "PRIVMSG NickServ :ACC alice\r\n");
        assert!(bridge.resolve("alice", level));

        let result = task.await.unwrap();
        assert!(!bridge.is_pending());
        result
    }

    #[tokio::test]
    async fn level_three_is_registered() {
        assert_eq!(query_with_reply(3).await, Ok(true));
    }

    #[tokio::test]
    async fn lower_levels_are_not_registered() {
        for level in [0, 1, 2] {
            assert_eq!(query_with_reply(level).await, Ok(false), "level {level}");
        }
    }

    #[tokio::test]
    async fn times_out_without_reply() {
        let bridge = AuthBridge::new(Duration::from_millis(20));
        let (outbound, _rx) = Outbound::channel();
        let result = bridge.is_registered_user(&outbound, "bob").await;
        assert_eq!(result, Err(AuthError::Timeout(Duration::from_millis(20))));
        assert!(!bridge.is_pending());
    }

    #[tokio::test]
    async fn second_query_is_rejected_while_first_is_pending() {
        let bridge = Arc::new(AuthBridge::default());
        let (outbound, mut rx) = Outbound::channel();

        let first = {
            let bridge = bridge.clone();
            let outbound = outbound.clone();
            tokio::spawn(async move { bridge.is_registered_user(&outbound, "alice").await })
        };
        rx.recv().await.unwrap();

        assert_eq!(
            bridge.is_registered_user(&outbound, "bob").await,
            Err(AuthError::Busy)
        );

        bridge.resolve("alice", 3);
        assert_eq!(first.await.unwrap(), Ok(true));
    }

    #[tokio::test]
    async fn next_query_survives_previous_caller_finishing() {
        let bridge = Arc::new(AuthBridge::default());
        let (outbound, mut rx) = Outbound::channel();

        let first = {
            let bridge = bridge.clone();
            let outbound = outbound.clone();
            tokio::spawn(async move { bridge.is_registered_user(&outbound, "alice").await })
        };
        rx.recv().await.unwrap();
        assert!(bridge.resolve("alice", 3));

        // Install the second query before the first task wakes up.
        let second = bridge.is_registered_user(&outbound, "bob");
        tokio::pin!(second);
        assert!(futures::poll!(&mut second).is_pending());
        assert_eq!(rx.recv().await.unwrap().text, "PRIVMSG NickServ :ACC bob\r\n");

        assert_eq!(first.await.unwrap(), Ok(true));
        assert!(bridge.is_pending());
        assert!(bridge.resolve("bob", 3));
        assert_eq!(second.await, Ok(true));
        assert!(!bridge.is_pending());
    }

    #[tokio::test]
    async fn reply_for_other_nick_is_ignored() {
        let bridge = Arc::new(AuthBridge::default());
        let (outbound, mut rx) = Outbound::channel();

        let task = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.is_registered_user(&outbound, "alice").await })
        };
        rx.recv().await.unwrap();

        assert!(!bridge.resolve("mallory", 3));
        assert!(bridge.is_pending());
        assert!(bridge.resolve("Alice", 1));
        assert_eq!(task.await.unwrap(), Ok(false));
    }

    #[tokio::test]
    async fn send_failure_is_reported() {
        let bridge = AuthBridge::default();
        let (outbound, rx) = Outbound::channel();
        drop(rx);
        assert!(matches!(
            bridge.is_registered_user(&outbound, "alice").await,
            Err(AuthError::Transport(_))
        ));
        assert!(!bridge.is_pending());
    }

    #[test]
    fn parses_acc_replies() {
        assert_eq!(parse_acc_reply("alice ACC 3"), Some(("alice", 3)));
        assert_eq!(parse_acc_reply("alice -> alice ACC 1"), Some(("alice", 1)));
        assert_eq!(parse_acc_reply("ACC 3"), None);
        assert_eq!(parse_acc_reply("alice ACC"), None);
        assert_eq!(parse_acc_reply("alice ACC x"), None);
        assert_eq!(parse_acc_reply("This nickname is registered."), None);
    }
}
