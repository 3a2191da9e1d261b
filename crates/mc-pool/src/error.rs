use std::sync::Arc;

use mc_core::ConnectionError;

/// Errors surfaced by [`Pool::call`](crate::Pool::call).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    /// Dialing a new connection failed. Only ever observed indirectly: growth itself retries with
    /// backoff and never surfaces a dial failure to a waiting caller directly, except when the
    /// pool is empty and Close races a caller, see [`PoolError::Closed`].
    #[error("failed to dial a new connection: {0}")]
    Dial(Arc<std::io::Error>),

    /// `ctx` fired while waiting for a lease, while enqueueing, or while waiting for completion.
    #[error("operation cancelled")]
    Cancelled,

    /// The pool has been closed, or the leased connection itself reported `connection-closed`.
    #[error("pool is closed")]
    Closed,

    /// A transport/framing error surfaced by the leased connection's `Send` or completion wait.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl PoolError {
    pub(crate) fn from_connection(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Cancelled => PoolError::Cancelled,
            ConnectionError::Closed => PoolError::Closed,
            other => PoolError::Connection(other),
        }
    }
}
