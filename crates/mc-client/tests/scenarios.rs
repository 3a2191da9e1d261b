use std::io;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use mc_client::{Client, Context, GetResult, PoolConfig};
use mc_core::{Connection, Message};
use mc_testserver::TestServer;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _};

#[tokio::test]
async fn scenario_1_round_trip() {
    let server = TestServer::bind().await.unwrap();
    let client = Client::connect(server.addr_string(), PoolConfig::new(1, 1)).await.unwrap();
    let ctx = Context::background();

    client
        .set(&ctx, "k", 77, b"v".to_vec(), Some(Duration::from_secs(3600)))
        .await
        .unwrap();

    match client.get(&ctx, "k").await.unwrap() {
        GetResult::Hit { value, flags } => {
            assert_eq!(value, b"v");
            assert_eq!(flags, 77);
        }
        GetResult::Miss => panic!("expected a hit"),
    }

    assert_eq!(client.get(&ctx, "missing").await.unwrap(), GetResult::Miss);
}

/// Sends a raw, unrecognized command line so the server answers with the bare `ERROR` keyword,
/// used only to exercise the generic protocol-error path directly against a `Connection`, since
/// `mc-proto`'s typed messages never produce one themselves for a well-formed request.
struct RawLineMessage {
    line: &'static str,
    response: Mutex<Option<String>>,
}

impl RawLineMessage {
    fn new(line: &'static str) -> Self {
        Self {
            line,
            response: Mutex::new(None),
        }
    }

    fn response(&self) -> String {
        self.response.lock().unwrap().clone().unwrap()
    }
}

#[async_trait]
impl Message for RawLineMessage {
    async fn write_request(&self, writer: &mut (dyn AsyncWrite + Send + Unpin)) -> io::Result<()> {
        writer.write_all(self.line.as_bytes()).await?;
        writer.write_all(b"\r\n").await
    }

    async fn read_response(&self, reader: &mut (dyn AsyncBufRead + Send + Unpin)) -> io::Result<()> {
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        *self.response.lock().unwrap() = Some(line.trim_end_matches(['\r', '\n']).to_owned());
        Ok(())
    }
}

#[tokio::test]
async fn scenario_2_protocol_error_does_not_kill_the_pipe() {
    let server = TestServer::bind().await.unwrap();
    let conn = Connection::open(server.addr_string()).await.unwrap();
    let ctx = Context::background();

    let reply = conn.call(&ctx, RawLineMessage::new("foo")).await.unwrap();
    assert_eq!(reply.response(), "ERROR");
    assert!(conn.is_open());

    // The same connection must still be usable for a well-formed request afterward.
    use mc_proto::{SetMessage, SetOutcome};
    let set = conn.call(&ctx, SetMessage::new("k", 0, None, b"v".to_vec())).await.unwrap();
    assert_eq!(set.outcome(), Some(&SetOutcome::Stored));
}

/// §8 scenario 3: a herd of workers hammering a short per-call deadline must never see a wrong
/// value or a spurious miss. Cancellation is allowed to happen, corruption is not.
#[tokio::test]
async fn scenario_3_concurrent_timeout_never_returns_a_wrong_value() {
    let server = TestServer::bind().await.unwrap();
    server.seed("k", 7, b"v".to_vec());
    let client = Client::connect(server.addr_string(), PoolConfig::new(0, 5)).await.unwrap();

    let mut workers = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        workers.push(tokio::spawn(async move {
            for _ in 0..50 {
                let ctx = Context::with_timeout(Duration::from_millis(2));
                match client.get(&ctx, "k").await {
                    Ok(GetResult::Hit { value, flags }) => {
                        assert_eq!(value, b"v");
                        assert_eq!(flags, 7);
                    }
                    Ok(GetResult::Miss) => panic!("\"k\" was seeded and never deleted, a miss is impossible"),
                    Err(_) => {} // cancelled before or during the round trip: acceptable under a 2ms deadline
                }
            }
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }

    client.close().await;
}

#[tokio::test]
async fn scenario_6_close_then_call_fails_fast() {
    let server = TestServer::bind().await.unwrap();
    let client = Client::connect(server.addr_string(), PoolConfig::new(1, 1)).await.unwrap();
    let ctx = Context::background();

    client.get(&ctx, "k").await.unwrap();
    client.close().await;

    let start = tokio::time::Instant::now();
    let err = client.get(&ctx, "k").await.unwrap_err();
    assert!(matches!(err, mc_client::ClientError::Pool(mc_pool::PoolError::Closed)));
    assert!(start.elapsed() < Duration::from_millis(100));
}
