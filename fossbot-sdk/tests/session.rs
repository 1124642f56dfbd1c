//! End-to-end session tests: a scripted byte source driving a
//! `Connection`, and a full `client::run` against a loopback server.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use fossbot_sdk::client::{self, ConnectConfig};
use fossbot_sdk::command::CommandTable;
use fossbot_sdk::connection::{Connection, MAX_CHANNELS, ReadOutcome, SessionState};
use fossbot_sdk::dispatch::{BotCommands, BotContext};
use fossbot_sdk::error::{JoinError, SessionError};
use fossbot_sdk::framer::NonBlockingRead;
use fossbot_sdk::message::ParsedMessage;
use fossbot_sdk::outbound::{Outbound, OutboundLine};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;

// ── Scripted source ──────────────────────────────────────────────

struct Chunks(VecDeque<Vec<u8>>);

impl Chunks {
    fn split(input: &[u8], size: usize) -> Self {
        Self(input.chunks(size).map(<[u8]>::to_vec).collect())
    }
}

impl NonBlockingRead for Chunks {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut chunk) = self.0.pop_front() else {
            return Err(io::ErrorKind::WouldBlock.into());
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.0.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

fn config() -> ConnectConfig {
    ConnectConfig {
        nick: "fossbot".into(),
        user: "fossbot".into(),
        rejoin_delay: Duration::ZERO,
        ..ConnectConfig::default()
    }
}

fn sent(rx: &mut UnboundedReceiver<OutboundLine>) -> Vec<String> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .map(|l| l.text.trim_end().to_string())
        .collect()
}

fn read_all(conn: &mut Connection, src: &mut Chunks) -> Vec<ParsedMessage> {
    let mut out = Vec::new();
    loop {
        match conn.read_message(src).unwrap() {
            ReadOutcome::Message(msg) => out.push(msg),
            ReadOutcome::WouldBlock | ReadOutcome::Closed => return out,
        }
    }
}

const TRAFFIC: &[u8] = b":irc.example.org NOTICE * :*** Looking up your hostname\r\n\
PING :irc.example.org\r\n\
:irc.example.org 001 fossbot :Welcome\r\n\
garbage without prefix\r\n\
:alice!a@host PRIVMSG #foss :!url https://example.org/a/long/path\r\n\
:irc.example.org 376 fossbot :End of /MOTD command.\n\
PING :again\r\n";

#[test]
fn any_split_yields_the_same_messages() {
    let (outbound, mut rx) = Outbound::channel();
    let mut conn = Connection::new(&config(), outbound);
    let expected = read_all(&mut conn, &mut Chunks::split(TRAFFIC, TRAFFIC.len()));
    let expected_sent = sent(&mut rx);

    assert_eq!(expected.len(), 4);
    assert_eq!(expected[2].command, "PRIVMSG");
    assert_eq!(expected_sent, vec!["PONG irc.example.org", "PONG again"]);

    for size in 1..TRAFFIC.len() {
        let (outbound, mut rx) = Outbound::channel();
        let mut conn = Connection::new(&config(), outbound);
        let mut src = Chunks::split(TRAFFIC, size);
        assert_eq!(read_all(&mut conn, &mut src), expected, "chunk size {size}");
        assert_eq!(sent(&mut rx), expected_sent, "chunk size {size}");
    }
}

#[test]
fn configured_channels_beyond_the_limit_are_refused() {
    let (outbound, mut rx) = Outbound::channel();
    let mut conn = Connection::new(&config(), outbound);
    for i in 0..=MAX_CHANNELS {
        let result = conn.join(&format!("#c{i}"));
        if i < MAX_CHANNELS {
            assert_eq!(result, Ok(()));
        } else {
            assert_eq!(result, Err(JoinError::ChannelLimit(MAX_CHANNELS)));
        }
    }
    conn.register().unwrap();
    conn.on_numeric(376).unwrap();

    let joins: Vec<String> = sent(&mut rx).into_iter().filter(|l| l.starts_with("JOIN")).collect();
    assert_eq!(joins.len(), MAX_CHANNELS);
    assert_eq!(joins.first().map(String::as_str), Some("JOIN #c0"));
    assert_eq!(conn.state(), SessionState::Joined);
}

#[test]
fn end_of_stream_disconnects() {
    struct Eof;
    impl NonBlockingRead for Eof {
        fn try_read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    let (outbound, _rx) = Outbound::channel();
    let mut conn = Connection::new(&config(), outbound);
    assert_eq!(conn.read_message(&mut Eof).unwrap(), ReadOutcome::Closed);
    assert_eq!(conn.state(), SessionState::Disconnected);
}

// ── Loopback server ──────────────────────────────────────────────

async fn echo(ctx: BotContext, msg: ParsedMessage) -> anyhow::Result<()> {
    ctx.say(msg.reply_target(), &msg.params)?;
    Ok(())
}

async fn bye(ctx: BotContext, _msg: ParsedMessage) -> anyhow::Result<()> {
    ctx.quit("later")?;
    Ok(())
}

async fn whoami(ctx: BotContext, msg: ParsedMessage) -> anyhow::Result<()> {
    let verdict = if ctx.is_registered_user(&msg.sender).await? {
        "is registered"
    } else {
        "is not registered"
    };
    ctx.say(msg.reply_target(), &format!("{} {verdict}", msg.sender))?;
    Ok(())
}

fn commands() -> Arc<BotCommands> {
    Arc::new(
        CommandTable::builder()
            .bot("echo", "echo arguments", echo)
            .bot("whoami", "ask NickServ about the caller", whoami)
            .bot("bye", "disconnect", bye)
            .build(),
    )
}

/// Server side of the loopback connection.
struct Peer {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Peer {
    async fn expect(&mut self, want: &str) {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for client line")
            .unwrap()
            .expect("client closed the connection");
        assert_eq!(line, want);
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(format!("{line}\r\n").as_bytes()).await.unwrap();
    }
}

async fn session(
    mut config: ConnectConfig,
) -> (Peer, oneshot::Sender<()>, tokio::task::JoinHandle<Result<(), SessionError>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    config.address = "127.0.0.1".into();
    config.port = listener.local_addr().unwrap().port();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let client = tokio::spawn(async move {
        let stream = client::connect(&config).await?;
        client::run(stream, &config, commands(), async {
            let _ = stop_rx.await;
        })
        .await
    });

    let (socket, _) = listener.accept().await.unwrap();
    let (reader, writer) = socket.into_split();
    let peer = Peer {
        lines: BufReader::new(reader).lines(),
        writer,
    };
    (peer, stop_tx, client)
}

#[tokio::test]
async fn full_session_over_loopback() {
    let (mut peer, stop, client) = session(ConnectConfig {
        channels: vec!["#foss".into()],
        nick_password: Some("hunter2".into()),
        ..config()
    })
    .await;

    peer.expect("NICK fossbot").await;
    peer.expect("USER fossbot 0 * :fossbot").await;

    peer.send(":irc.example.org 433 * fossbot :Nickname is already in use").await;
    peer.expect("NICK fossbot_").await;

    peer.send("PING :irc.example.org").await;
    peer.expect("PONG irc.example.org").await;

    peer.send(":irc.example.org 376 fossbot_ :End of /MOTD command.").await;
    peer.expect("JOIN #foss").await;

    peer.send(":NickServ!NickServ@services. NOTICE fossbot_ :This nickname is registered.").await;
    peer.expect("PRIVMSG NickServ :identify hunter2").await;

    peer.send(":alice!a@host PRIVMSG #foss :!echo hello there").await;
    peer.expect("PRIVMSG #foss :hello there").await;

    peer.send(":alice!a@host PRIVMSG fossbot_ :\x01VERSION\x01").await;
    peer.expect(&format!("NOTICE alice :\x01VERSION {}\x01", config().bot_version)).await;

    peer.send(":alice!a@host PRIVMSG #foss :!whoami").await;
    peer.expect("PRIVMSG NickServ :ACC alice").await;
    peer.send(":NickServ!NickServ@services. NOTICE fossbot_ :alice ACC 3").await;
    peer.expect("PRIVMSG #foss :alice is registered").await;

    peer.send(":op!o@host KICK #foss fossbot_ :bye").await;
    peer.expect("JOIN #foss").await;
    peer.expect("PRIVMSG #foss :op magkas...").await;

    stop.send(()).unwrap();
    peer.expect("QUIT :Bye").await;
    assert!(client.await.unwrap().is_ok());
}

#[tokio::test]
async fn server_hangup_ends_session_with_closed() {
    let (mut peer, _stop, client) = session(config()).await;
    peer.expect("NICK fossbot").await;
    peer.expect("USER fossbot 0 * :fossbot").await;
    drop(peer);

    let result = tokio::time::timeout(Duration::from_secs(5), client).await.unwrap().unwrap();
    assert!(matches!(result, Err(SessionError::Closed)));
}

#[tokio::test]
async fn server_close_after_requested_quit_is_clean() {
    let (mut peer, _stop, client) = session(config()).await;
    peer.expect("NICK fossbot").await;
    peer.expect("USER fossbot 0 * :fossbot").await;

    peer.send(":alice!a@host PRIVMSG fossbot :!bye").await;
    peer.expect("QUIT :later").await;
    drop(peer);

    let result = tokio::time::timeout(Duration::from_secs(5), client).await.unwrap().unwrap();
    assert!(result.is_ok(), "{result:?}");
}
