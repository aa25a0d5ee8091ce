//! The IRC server internals: wire format, tables, dispatch, and the
//! event loop, plus the companion bot client.

pub mod bot;
pub mod channels;
pub mod conn;
pub mod dispatch;
pub mod framing;
pub mod message;
pub mod modes;
pub mod ops;
pub mod reactor;
pub mod replies;
pub mod server;
pub mod state;
pub mod users;
