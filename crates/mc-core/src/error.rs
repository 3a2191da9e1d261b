use std::io;
use std::sync::Arc;

/// Errors a [`Connection`](crate::Connection) can surface to a caller.
///
/// Per the framework's error discipline, only transport/framing failures are represented here.
/// Protocol-level errors (the server answered with an error keyword) never reach this type; they
/// are recorded on the `Message` itself and `Connection` stays healthy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    /// The underlying socket failed to read or write, or a codec reported the response bytes
    /// could not be framed correctly. Either way, the connection is poisoned from this point on.
    #[error("transport error: {0}")]
    Transport(Arc<io::Error>),

    /// The request was submitted after the connection was closed, or was still in the request
    /// channel when `Close` ran.
    #[error("connection is closed")]
    Closed,

    /// The calling context was cancelled (explicitly, or its deadline elapsed) before the
    /// operation could complete.
    #[error("operation cancelled")]
    Cancelled,
}

impl ConnectionError {
    pub(crate) fn from_io(err: io::Error) -> Self {
        Self::Transport(Arc::new(err))
    }

    /// True for errors that mean the connection can no longer carry any work.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Closed)
    }
}
