//! fossbot: an IRC bot for the FOSS community channel.
//!
//! Built on `fossbot-sdk`. This crate holds the user-facing commands
//! (network diagnostics, GitHub commits, URL shortening) and the
//! configuration layer.

pub mod commands;
pub mod config;
pub mod output;
