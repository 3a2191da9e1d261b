use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::oneshot;

use crate::context::Context;
use crate::error::ConnectionError;
use crate::message::Message;

/// Type-erased entry living in a `Connection`'s request channel and pending FIFO.
///
/// A single socket pipelines heterogeneous `Message` implementors (a `get` and a `set` can be
/// in flight on the same connection at once), so the channels carry this object-safe trait
/// instead of being generic over one concrete `Message` type.
#[async_trait]
pub(crate) trait PipelineEntry: Send {
    async fn write(&self, writer: &mut (dyn AsyncWrite + Send + Unpin)) -> io::Result<()>;
    async fn read(&self, reader: &mut (dyn AsyncBufRead + Send + Unpin)) -> io::Result<()>;
    /// Fires the completion signal with a transport error, without touching the socket.
    fn fail(&self, err: ConnectionError);
    /// Fires the completion signal after a successful `read`.
    fn complete(&self);
}

struct Envelope<M: Message> {
    msg: Arc<M>,
    transport_error: Arc<Mutex<Option<ConnectionError>>>,
    completion_tx: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl<M: Message> PipelineEntry for Envelope<M> {
    async fn write(&self, writer: &mut (dyn AsyncWrite + Send + Unpin)) -> io::Result<()> {
        self.msg.write_request(writer).await
    }

    async fn read(&self, reader: &mut (dyn AsyncBufRead + Send + Unpin)) -> io::Result<()> {
        self.msg.read_response(reader).await
    }

    fn fail(&self, err: ConnectionError) {
        *self.transport_error.lock().expect("transport_error mutex poisoned") = Some(err);
        self.complete();
    }

    fn complete(&self) {
        if let Some(tx) = self
            .completion_tx
            .lock()
            .expect("completion_tx mutex poisoned")
            .take()
        {
            // The receiver may already be gone if the caller cancelled its wait; that is fine,
            // the response was still drained from the socket as the specification requires.
            let _ = tx.send(());
        }
    }
}

/// A `Message` in flight: submitted to a `Connection`, not yet known to have completed.
///
/// Jointly owned by the caller (through this handle) and the connection's read task (through the
/// boxed [`PipelineEntry`] sitting in the pending FIFO) until the response is parsed, a transport
/// error poisons the connection, or the connection shuts down, whichever comes first fires the
/// completion signal exactly once.
#[must_use = "a PendingMessage does nothing until awaited"]
pub struct PendingMessage<M: Message> {
    msg: Arc<M>,
    transport_error: Arc<Mutex<Option<ConnectionError>>>,
    completion_rx: oneshot::Receiver<()>,
}

impl<M: Message> PendingMessage<M> {
    pub(crate) fn with_message(msg: M) -> (Self, Box<dyn PipelineEntry>, Arc<M>) {
        let msg = Arc::new(msg);
        let transport_error = Arc::new(Mutex::new(None));
        let (completion_tx, completion_rx) = oneshot::channel();

        let entry: Box<dyn PipelineEntry> = Box::new(Envelope {
            msg: Arc::clone(&msg),
            transport_error: Arc::clone(&transport_error),
            completion_tx: Mutex::new(Some(completion_tx)),
        });

        let handle = PendingMessage {
            msg: Arc::clone(&msg),
            transport_error,
            completion_rx,
        };

        (handle, entry, msg)
    }

    /// The message submitted for this call. Readable at any time, but its response fields are
    /// only meaningful after [`wait`](Self::wait) resolves successfully.
    pub fn message(&self) -> &M {
        &self.msg
    }

    /// Waits for the response to be parsed into [`message`](Self::message), or for `ctx` to be
    /// cancelled.
    ///
    /// On cancellation the request remains in flight: the connection's read task will still parse
    /// the response bytes (they must be consumed to keep the pipeline in sync) and discard them,
    /// since nothing observes the completion signal anymore. The message must be treated as
    /// poisoned and not reused after a cancelled wait.
    pub async fn wait(mut self, ctx: &Context) -> Result<Arc<M>, ConnectionError> {
        tokio::select! {
            result = &mut self.completion_rx => {
                match result {
                    Ok(()) => {
                        if let Some(err) = self.transport_error.lock().expect("transport_error mutex poisoned").take() {
                            Err(err)
                        } else {
                            Ok(self.msg)
                        }
                    }
                    Err(_) => Err(ConnectionError::Closed),
                }
            }
            () = ctx.cancelled() => Err(ConnectionError::Cancelled),
        }
    }
}
