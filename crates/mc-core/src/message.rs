use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncWrite};

/// A single request/response exchange that can be pipelined over a [`Connection`](crate::Connection).
///
/// Implementors are the concrete wire commands (`get`, `set`, ...): `mc-core` knows nothing about
/// the memcached text protocol, only that a `Message` can serialize itself and later parse
/// exactly the bytes of its own response.
///
/// Both methods take `&self` rather than `&mut self`: a `Message` is shared between the caller and
/// the connection's internal pipeline for its whole lifetime (see [`PendingMessage`]), so
/// implementors store their parsed outcome behind interior mutability (a `Mutex`, a `OnceLock`,
/// ...) rather than through a return value threaded back up through the framework.
///
/// `read_response` must consume *exactly* the bytes belonging to this response and no more: the
/// next queued `Message` on the same connection starts reading where this one stopped.
#[async_trait]
pub trait Message: Send + Sync + 'static {
    /// Serialize this request onto `writer`. The framework flushes on the caller's behalf once
    /// this returns; implementors should not flush themselves.
    async fn write_request(&self, writer: &mut (dyn AsyncWrite + Send + Unpin)) -> io::Result<()>;

    /// Parse this request's response from `reader`. A return of `Ok(())` means the outcome (value,
    /// miss, protocol error, ...) has been recorded on `self`; an `Err` means the bytes could not
    /// be framed and the connection must be torn down.
    async fn read_response(&self, reader: &mut (dyn AsyncBufRead + Send + Unpin)) -> io::Result<()>;
}
