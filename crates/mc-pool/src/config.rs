use std::time::Duration;

/// Tunables for a [`Pool`](crate::Pool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections dialed eagerly at [`Pool::open`](crate::Pool::open). Open fails fast if any of
    /// these initial dials fail.
    pub min: usize,
    /// Hard cap on the number of connections the pool will ever hold at once.
    pub max: usize,
    /// Per-connection pending FIFO capacity; forwarded to [`Connection::open_with_capacity`](mc_core::Connection::open_with_capacity).
    pub pending_capacity: usize,
    /// Growth backoff starting delay's increment, and its ceiling. See §4.3.3.
    pub backoff_step: Duration,
    pub backoff_max: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: 0,
            max: 10,
            pending_capacity: mc_core::DEFAULT_PENDING_CAPACITY,
            backoff_step: Duration::from_millis(10),
            backoff_max: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    pub fn new(min: usize, max: usize) -> Self {
        Self {
            min,
            max,
            ..Self::default()
        }
    }
}
