//! ftirc — a single-process RFC 1459 IRC server and its companion bot.

pub mod config;
pub mod irc;
