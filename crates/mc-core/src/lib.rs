//! Protocol-agnostic pipelined request/response connection.
//!
//! `mc-core` knows nothing about memcached: it owns one TCP socket, pipelines arbitrary
//! [`Message`] implementors over it, and matches responses to requests strictly by send order
//! (see [`Connection`]). The memcached text codec lives in `mc-proto`; connection pooling lives
//! in `mc-pool`.

mod connection;
mod context;
mod error;
mod message;
mod pending;

pub use connection::{Connection, DEFAULT_PENDING_CAPACITY};
pub use context::Context;
pub use error::ConnectionError;
pub use message::Message;
pub use pending::PendingMessage;
