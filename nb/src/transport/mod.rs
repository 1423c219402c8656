//! Chat transport boundary
//!
//! Outbound: the [`Messenger`] trait and its bot-API implementation.
//! Inbound: a Unix-socket listener that delivers webhook payloads to the
//! chat service and acknowledges every one of them.

mod api;
mod listener;

pub use api::{BotApi, Messenger};
pub use listener::{cleanup_socket, create_listener_at, run_listener};
