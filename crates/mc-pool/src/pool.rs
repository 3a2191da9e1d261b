use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mc_core::{Connection, Context, Message};
use rand::Rng as _;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, instrument, warn};

use crate::config::PoolConfig;
use crate::error::PoolError;

/// A bounded set of pipelined [`Connection`]s to one address.
///
/// Cloning a `Pool` is cheap and shares the same owned connections, lease channel, and growth
/// state (analogous to [`Connection`] itself).
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Inner>,
}

struct Inner {
    addr: String,
    config: PoolConfig,
    connections: std::sync::Mutex<Vec<Connection>>,
    lease_tx: mpsc::Sender<Connection>,
    lease_rx: AsyncMutex<mpsc::Receiver<Connection>>,
    is_closed: AtomicBool,
    grow_lock: Arc<AsyncMutex<()>>,
}

impl Pool {
    /// Dials `config.min` connections eagerly and fails fast if any of them fail. `config.max` is
    /// stored as the hard cap that later growth never exceeds.
    #[instrument(skip(config), fields(addr = %addr.as_ref(), min = config.min, max = config.max))]
    pub async fn open(addr: impl AsRef<str>, config: PoolConfig) -> std::io::Result<Self> {
        let addr = addr.as_ref().to_owned();
        let (lease_tx, lease_rx) = mpsc::channel(config.max.max(1));

        let mut connections = Vec::with_capacity(config.min);
        for _ in 0..config.min {
            let conn = Connection::open_with_capacity(&addr, config.pending_capacity).await?;
            lease_tx
                .send(conn.clone())
                .await
                .expect("lease channel just created, cannot be closed yet");
            connections.push(conn);
        }

        Ok(Self {
            inner: Arc::new(Inner {
                addr,
                config,
                connections: std::sync::Mutex::new(connections),
                lease_tx,
                lease_rx: AsyncMutex::new(lease_rx),
                is_closed: AtomicBool::new(false),
                grow_lock: Arc::new(AsyncMutex::new(())),
            }),
        })
    }

    /// Leases a connection, submits `msg`, and waits for its response, or for `ctx` to fire at
    /// any of the three cancellation points in §4.3.5.
    #[instrument(skip_all, fields(pool_addr = %self.inner.addr))]
    pub async fn call<M: Message>(&self, ctx: &Context, msg: M) -> Result<Arc<M>, PoolError> {
        if self.inner.is_closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }

        let conn = self.lease(ctx).await?;

        let pending = {
            let result = conn.send(ctx, msg).await;
            // Step 4: push back regardless of outcome, the connection is still usable for other
            // callers even if this particular Send failed on it.
            let _ = self.inner.lease_tx.try_send(conn);
            result.map_err(PoolError::from_connection)?
        };

        pending.wait(ctx).await.map_err(PoolError::from_connection)
    }

    async fn lease(&self, ctx: &Context) -> Result<Connection, PoolError> {
        loop {
            if self.lease_is_empty() {
                self.try_grow();
            }

            let mut rx = self.inner.lease_rx.lock().await;
            let conn = tokio::select! {
                conn = rx.recv() => conn.ok_or(PoolError::Closed)?,
                () = ctx.cancelled() => return Err(PoolError::Cancelled),
            };
            drop(rx);

            if !conn.is_open() {
                debug!("discarding dead connection observed in lease channel");
                continue;
            }
            return Ok(conn);
        }
    }

    fn lease_is_empty(&self) -> bool {
        self.inner.lease_tx.capacity() == self.inner.lease_tx.max_capacity()
    }

    /// Fires a non-blocking grow attempt. A grow already in progress short-circuits this one.
    fn try_grow(&self) {
        let Ok(guard) = Arc::clone(&self.inner.grow_lock).try_lock_owned() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        tokio::spawn(grow(inner, guard));
    }

    /// Closes every owned connection and forbids further growth. Idempotent.
    #[instrument(skip_all, fields(pool_addr = %self.inner.addr))]
    pub async fn close(&self) {
        if self.inner.is_closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let connections = std::mem::take(&mut *self.inner.connections.lock().expect("connections mutex poisoned"));
        for conn in connections {
            conn.close();
        }
    }

    /// Number of connections currently owned by the pool. Exposed for tests and observability.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().expect("connections mutex poisoned").len()
    }
}

#[instrument(skip_all, fields(pool_addr = %inner.addr))]
async fn grow(inner: Arc<Inner>, _guard: tokio::sync::OwnedMutexGuard<()>) {
    let mut delay = Duration::ZERO;

    loop {
        if inner.is_closed.load(Ordering::SeqCst) {
            return;
        }

        let live_count = {
            let mut connections = inner.connections.lock().expect("connections mutex poisoned");
            connections.retain(Connection::is_open);
            connections.len()
        };

        if live_count >= inner.config.max {
            return;
        }

        match Connection::open_with_capacity(&inner.addr, inner.config.pending_capacity).await {
            Ok(conn) => {
                inner
                    .connections
                    .lock()
                    .expect("connections mutex poisoned")
                    .push(conn.clone());
                // The lease channel's capacity is `max`, and we never hold more live connections
                // than `max`, so this can only fail if the pool was closed concurrently.
                let _ = inner.lease_tx.try_send(conn);
                return;
            }
            Err(err) => {
                warn!(%err, delay_ms = delay.as_millis(), "dial failed, backing off before retry");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let jitter_ms = if delay.is_zero() {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay.as_millis() as u64)
                };
                delay = (delay + Duration::from_millis(10) + Duration::from_millis(jitter_ms))
                    .min(inner.config.backoff_max);
            }
        }
    }
}
