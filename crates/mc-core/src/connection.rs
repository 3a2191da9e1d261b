use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use mc_task::ChildTask;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{instrument, warn, Instrument as _, Span};

use crate::context::Context;
use crate::error::ConnectionError;
use crate::message::Message;
use crate::pending::{PendingMessage, PipelineEntry};

/// Size of the pending FIFO: how many in-flight requests a single connection tolerates before
/// the write task starts blocking new sends. See §4.2.5 of the design: this is the pipelining
/// backpressure knob.
pub const DEFAULT_PENDING_CAPACITY: usize = 1024;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// One pipelined TCP connection.
///
/// Cloning a `Connection` is cheap and shares the same socket and internal tasks: this is what
/// lets a [`Pool`](https://docs.rs/mc-pool) return a connection to its lease channel immediately
/// after enqueuing a request, while another caller's in-flight call is still being read back.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    request_tx: Mutex<Option<mpsc::Sender<Box<dyn PipelineEntry>>>>,
    is_open: Arc<AtomicBool>,
    // Held only to keep the tasks alive for the connection's lifetime and abort them on drop;
    // never read otherwise.
    _write_task: ChildTask<()>,
    _read_task: ChildTask<()>,
}

impl Connection {
    /// Dials `addr` and starts the write/read pipeline. Fails if the TCP dial fails.
    #[instrument(name = "connection_open", skip(addr), fields(connection_id))]
    pub async fn open(addr: impl ToSocketAddrs) -> std::io::Result<Self> {
        Self::open_with_capacity(addr, DEFAULT_PENDING_CAPACITY).await
    }

    /// Like [`open`](Self::open) but with an explicit pending FIFO capacity instead of
    /// [`DEFAULT_PENDING_CAPACITY`].
    pub async fn open_with_capacity(addr: impl ToSocketAddrs, pending_capacity: usize) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).ok();

        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        Span::current().record("connection_id", id);

        let (read_half, write_half) = stream.into_split();
        let reader = BufReader::new(read_half);
        let writer = BufWriter::new(write_half);

        // The request channel is the rendezvous point between callers and the write task: a
        // capacity of one is the closest Tokio's `mpsc` gets to an unbuffered channel, since a
        // sender's `send` only returns once the write task has taken ownership of the slot.
        let (request_tx, request_rx) = mpsc::channel(1);
        let (pending_tx, pending_rx) = mpsc::channel(pending_capacity);

        let is_open = Arc::new(AtomicBool::new(true));

        let span = Span::current();

        let write_task = ChildTask::spawn(
            write_task(writer, request_rx, pending_tx, Arc::clone(&is_open), id).instrument(span.clone()),
        );
        let read_task = ChildTask::spawn(read_task(reader, pending_rx, Arc::clone(&is_open), id).instrument(span));

        Ok(Self {
            inner: Arc::new(Inner {
                id,
                request_tx: Mutex::new(Some(request_tx)),
                is_open,
                _write_task: write_task,
                _read_task: read_task,
            }),
        })
    }

    /// Opaque identity used only to tell connections apart in logs.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Hands `msg` to the connection's pipeline without waiting for its response.
    ///
    /// Returns once the request has been accepted by the write task (not once it has been
    /// flushed), or [`ConnectionError::Cancelled`] if `ctx` fires first, or
    /// [`ConnectionError::Closed`] if the connection was already closed.
    pub async fn send<M: Message>(&self, ctx: &Context, msg: M) -> Result<PendingMessage<M>, ConnectionError> {
        let (handle, entry, _msg) = PendingMessage::with_message(msg);

        let sender = {
            let guard = self.inner.request_tx.lock().expect("request_tx mutex poisoned");
            guard.as_ref().cloned()
        };
        let Some(sender) = sender else {
            return Err(ConnectionError::Closed);
        };

        tokio::select! {
            result = sender.send(entry) => {
                result.map_err(|_| ConnectionError::Closed)?;
                Ok(handle)
            }
            () = ctx.cancelled() => Err(ConnectionError::Cancelled),
        }
    }

    /// Convenience: [`send`](Self::send) then [`PendingMessage::wait`].
    ///
    /// If `ctx` fires after the request was enqueued, this still returns
    /// [`ConnectionError::Cancelled`], but the request is *not* aborted: the connection will still
    /// read and discard its response to keep the pipeline in sync.
    pub async fn call<M: Message>(&self, ctx: &Context, msg: M) -> Result<Arc<M>, ConnectionError> {
        let pending = self.send(ctx, msg).await?;
        pending.wait(ctx).await
    }

    /// Whether this connection is still believed usable for new work.
    ///
    /// Becomes `false` the moment either internal task observes a transport error, or once
    /// [`close`](Self::close) has been called. Never becomes `true` again: a poisoned or closed
    /// connection is never resurrected, a fresh one is dialed instead.
    pub fn is_open(&self) -> bool {
        self.inner.is_open.load(Ordering::SeqCst)
    }

    /// Signals shutdown by closing the request channel. The write and read tasks drain whatever
    /// was already in flight and then exit; the socket closes once both halves are dropped.
    ///
    /// Idempotent: closing an already-closed connection is a no-op.
    pub fn close(&self) {
        self.inner.is_open.store(false, Ordering::SeqCst);
        self.inner
            .request_tx
            .lock()
            .expect("request_tx mutex poisoned")
            .take();
    }
}

#[instrument(name = "write", skip_all, fields(connection_id = id))]
async fn write_task(
    mut writer: BufWriter<OwnedWriteHalf>,
    mut request_rx: mpsc::Receiver<Box<dyn PipelineEntry>>,
    pending_tx: mpsc::Sender<Box<dyn PipelineEntry>>,
    is_open: Arc<AtomicBool>,
    id: u64,
) {
    let mut poisoned = false;

    while let Some(entry) = request_rx.recv().await {
        if poisoned {
            entry.fail(ConnectionError::Closed);
            continue;
        }

        let outcome = async {
            entry.write(&mut writer).await?;
            writer.flush().await
        }
        .await;

        match outcome {
            Ok(()) => {
                if pending_tx.send(entry).await.is_err() {
                    warn!(connection_id = id, "pending FIFO closed while write task still active");
                    break;
                }
            }
            Err(err) => {
                warn!(connection_id = id, %err, "write task poisoned by transport error");
                is_open.store(false, Ordering::SeqCst);
                entry.fail(ConnectionError::from_io(err));
                poisoned = true;
            }
        }
    }

    // Dropping `pending_tx` signals the read task that no more responses are expected once it
    // has drained whatever is already queued.
    drop(pending_tx);
}

#[instrument(name = "read", skip_all, fields(connection_id = id))]
async fn read_task(
    mut reader: BufReader<OwnedReadHalf>,
    mut pending_rx: mpsc::Receiver<Box<dyn PipelineEntry>>,
    is_open: Arc<AtomicBool>,
    id: u64,
) {
    let mut poisoned = false;

    while let Some(entry) = pending_rx.recv().await {
        if poisoned {
            entry.fail(ConnectionError::Closed);
            continue;
        }

        match entry.read(&mut reader).await {
            Ok(()) => entry.complete(),
            Err(err) => {
                warn!(connection_id = id, %err, "read task poisoned by transport error");
                is_open.store(false, Ordering::SeqCst);
                entry.fail(ConnectionError::from_io(err));
                poisoned = true;
            }
        }
    }

    // `reader` and (already moved out) `writer` are dropped here, closing both halves of the
    // socket.
}
