//! fossbot-sdk: session engine for an IRC bot.
//!
//! Owns one connection to an IRC server: frames the raw byte stream into
//! messages, tracks registration and channel membership, and dispatches
//! bot commands to isolated tasks.
//!
//! - [`client`]: connect and run the read loop
//! - [`connection`]: identity, channel membership and the session state machine
//! - [`framer`]: line reassembly over non-blocking reads
//! - [`dispatch`]: protocol handlers and isolated bot command execution
//! - [`auth`]: NickServ `ACC` request/response bridge

pub mod auth;
pub mod client;
pub mod command;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod framer;
pub mod message;
pub mod outbound;
