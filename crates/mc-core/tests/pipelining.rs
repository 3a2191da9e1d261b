//! Exercises the "return connection to pool before response" pipelining guarantee (§4.2.4) using
//! a throwaway line-echo server, since `mc-core` itself knows nothing about memcached.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mc_core::{Connection, Context, Message};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tokio::net::TcpListener;

/// Writes `request\n`, expects the server to echo it back verbatim on its own line.
struct EchoMessage {
    request: String,
    response: Mutex<Option<String>>,
}

impl EchoMessage {
    fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            response: Mutex::new(None),
        }
    }

    fn response(&self) -> String {
        self.response.lock().unwrap().clone().expect("response not yet set")
    }
}

#[async_trait]
impl Message for EchoMessage {
    async fn write_request(&self, writer: &mut (dyn AsyncWrite + Send + Unpin)) -> io::Result<()> {
        writer.write_all(self.request.as_bytes()).await?;
        writer.write_all(b"\n").await
    }

    async fn read_response(&self, reader: &mut (dyn AsyncBufRead + Send + Unpin)) -> io::Result<()> {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "echo server closed early"));
        }
        *self.response.lock().unwrap() = Some(line.trim_end_matches('\n').to_owned());
        Ok(())
    }
}

async fn spawn_echo_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { return };
            tokio::spawn(async move {
                let (read_half, mut write_half) = stream.into_split();
                let mut reader = tokio::io::BufReader::new(read_half);
                loop {
                    let mut line = String::new();
                    let n = reader.read_line(&mut line).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    if write_half.write_all(line.as_bytes()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    addr
}

#[tokio::test]
async fn responses_arrive_in_send_order() {
    let addr = spawn_echo_server().await;
    let conn = Connection::open(addr).await.unwrap();
    let ctx = Context::background();

    let mut pendings = Vec::new();
    for i in 0..20 {
        pendings.push(conn.send(&ctx, EchoMessage::new(format!("msg-{i}"))).await.unwrap());
    }

    for (i, pending) in pendings.into_iter().enumerate() {
        let msg = pending.wait(&ctx).await.unwrap();
        assert_eq!(msg.response(), format!("msg-{i}"));
    }
}

#[tokio::test]
async fn concurrent_callers_each_get_their_own_responses() {
    let addr = spawn_echo_server().await;
    let conn = Arc::new(Connection::open(addr).await.unwrap());
    let ctx = Context::background();
    let mismatches = Arc::new(AtomicUsize::new(0));

    let mut callers = Vec::new();
    for caller in 0..8 {
        let conn = Arc::clone(&conn);
        let ctx = ctx.clone();
        let mismatches = Arc::clone(&mismatches);
        callers.push(tokio::spawn(async move {
            for i in 0..10 {
                let request = format!("caller-{caller}-{i}");
                let msg = conn
                    .call(&ctx, EchoMessage::new(request.clone()))
                    .await
                    .expect("call should succeed");
                if msg.response() != request {
                    mismatches.fetch_add(1, Ordering::SeqCst);
                }
            }
        }));
    }

    for caller in callers {
        caller.await.unwrap();
    }

    assert_eq!(mismatches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn closing_fails_pending_and_future_sends() {
    let addr = spawn_echo_server().await;
    let conn = Connection::open(addr).await.unwrap();
    let ctx = Context::background();

    conn.close();
    assert!(!conn.is_open());

    let err = conn.send(&ctx, EchoMessage::new("x")).await.unwrap_err();
    assert!(matches!(err, mc_core::ConnectionError::Closed));
}

#[tokio::test]
async fn cancelled_wait_does_not_abort_the_in_flight_request() {
    let addr = spawn_echo_server().await;
    let conn = Connection::open(addr).await.unwrap();

    let pending = conn.send(&Context::background(), EchoMessage::new("slow")).await.unwrap();

    // An already-cancelled context fires immediately; the response is still drained afterward by
    // the read task even though nothing is left waiting on it.
    let already_cancelled = Context::with_timeout(Duration::from_millis(0));
    let err = pending.wait(&already_cancelled).await.unwrap_err();
    assert!(matches!(err, mc_core::ConnectionError::Cancelled));

    // The connection must still be healthy: the dropped response didn't poison it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(conn.is_open());
}
