//! The memcached ASCII text protocol: `get`/`set` framing, TTL encoding, and the server's error
//! taxonomy, expressed as [`mc_core::Message`] implementors.
//!
//! This crate is deliberately thin: it has no notion of a socket or a pool, only how to turn a
//! command into bytes and how to turn a response's bytes back into a typed outcome.

mod error;
mod exptime;
mod get;
mod line;
mod set;

pub use error::{ProtoError, ServerError};
pub use exptime::encode_exptime;
pub use get::{GetMessage, GetOutcome};
pub use set::{SetMessage, SetOutcome};
