//! Wire protocol, TCP server and client
//!
//! Requests are single text lines. Responses are frames, optionally wrapped
//! in an `OK <len>` / `ERR <len>` envelope so a client can read them off a
//! stream without guessing where one ends. Under the envelope a request the
//! client expects an answer to always gets one: when the real frame cannot
//! be produced or sent, an empty `ERR 0` frame takes its place.

mod client;
mod encoder;
mod protocol;
mod server;

pub use client::{is_daemon_running, DaemonClient};
pub use encoder::ResponseEncoder;
pub use protocol::*;
pub use server::DaemonServer;
