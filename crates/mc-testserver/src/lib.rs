//! An in-process stand-in for a memcached server, used only by `mc-pool` and `mc-client` tests.
//!
//! This is the "external collaborator" described in §6 of the design: an accept loop, one handler
//! task per connection, and a user-visible in-memory store so tests can assert on what actually
//! got written. It speaks just enough of the wire protocol (`get`/`set`) to exercise the client
//! side; it does not attempt to be a faithful memcached reimplementation.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use mc_task::ChildTask;
use tokio::io::{AsyncBufReadExt as _, AsyncReadExt as _, AsyncWriteExt as _, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{instrument, warn};

type Entry = (u16, Vec<u8>);
type Store = Arc<Mutex<HashMap<String, Entry>>>;

/// A bound test server. Dropping it stops accepting new connections; connections already accepted
/// keep running until their socket closes.
pub struct TestServer {
    addr: SocketAddr,
    store: Store,
    disconnect_all: broadcast::Sender<()>,
    _accept_task: ChildTask<()>,
}

impl TestServer {
    /// Binds an ephemeral port on loopback and starts accepting connections.
    pub async fn bind() -> std::io::Result<Self> {
        Self::bind_at(("127.0.0.1", 0)).await
    }

    /// Binds a specific address, e.g. to reclaim a port freed by a previous listener in a test.
    pub async fn bind_at(addr: impl tokio::net::ToSocketAddrs) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let store: Store = Arc::new(Mutex::new(HashMap::new()));
        let (disconnect_all, _) = broadcast::channel(1);

        let accept_task = ChildTask::spawn(accept_loop(listener, Arc::clone(&store), disconnect_all.clone()));

        Ok(Self {
            addr,
            store,
            disconnect_all,
            _accept_task: accept_task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `host:port` string suitable for `Pool::open`/`Connection::open`.
    pub fn addr_string(&self) -> String {
        self.addr.to_string()
    }

    /// A snapshot of everything currently stored, for test assertions.
    pub fn snapshot(&self) -> HashMap<String, (u16, Vec<u8>)> {
        self.store.lock().expect("store mutex poisoned").clone()
    }

    /// Seeds a key directly, bypassing the wire protocol.
    pub fn seed(&self, key: impl Into<String>, flags: u16, payload: Vec<u8>) {
        self.store
            .lock()
            .expect("store mutex poisoned")
            .insert(key.into(), (flags, payload));
    }

    /// Force-closes every connection currently accepted by the server, simulating a server-side
    /// reset storm (§8 scenario 4). New connections accepted afterward are unaffected.
    pub fn disconnect_all(&self) {
        // No receivers (e.g. no connections currently open) is not an error here.
        let _ = self.disconnect_all.send(());
    }
}

#[instrument(skip_all)]
async fn accept_loop(listener: TcpListener, store: Store, disconnect_all: broadcast::Sender<()>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let store = Arc::clone(&store);
                let disconnect_rx = disconnect_all.subscribe();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(stream, store, disconnect_rx).await {
                        warn!(%peer, %err, "test server connection ended with an error");
                    }
                });
            }
            Err(err) => {
                warn!(%err, "accept failed, stopping test server");
                return;
            }
        }
    }
}

/// Reads commands one line at a time and responds immediately: strictly sequential per
/// connection, which trivially satisfies "responses emitted in request order".
async fn handle_connection(
    stream: TcpStream,
    store: Store,
    mut disconnect_rx: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    stream.set_nodelay(true).ok();
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);

    loop {
        let mut line = String::new();
        let n = tokio::select! {
            result = reader.read_line(&mut line) => result?,
            _ = disconnect_rx.recv() => return Ok(()),
        };
        if n == 0 {
            return Ok(());
        }
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.split(' ');

        match parts.next() {
            Some("get") => {
                let Some(key) = parts.next() else {
                    writer.write_all(b"ERROR\r\n").await?;
                    writer.flush().await?;
                    continue;
                };
                let entry = store.lock().expect("store mutex poisoned").get(key).cloned();
                if let Some((flags, payload)) = entry {
                    writer
                        .write_all(format!("VALUE {key} {flags} {}\r\n", payload.len()).as_bytes())
                        .await?;
                    writer.write_all(&payload).await?;
                    writer.write_all(b"\r\n").await?;
                }
                writer.write_all(b"END\r\n").await?;
            }
            Some("set") => {
                let (Some(key), Some(flags), Some(_exptime), Some(length)) =
                    (parts.next(), parts.next(), parts.next(), parts.next())
                else {
                    writer.write_all(b"CLIENT_ERROR bad command line format\r\n").await?;
                    writer.flush().await?;
                    continue;
                };
                let (Ok(flags), Ok(length)) = (flags.parse::<u16>(), length.parse::<usize>()) else {
                    writer.write_all(b"CLIENT_ERROR bad command line format\r\n").await?;
                    writer.flush().await?;
                    continue;
                };

                let mut payload = vec![0u8; length];
                reader.read_exact(&mut payload).await?;
                let mut trailer = [0u8; 2];
                reader.read_exact(&mut trailer).await?;
                if &trailer != b"\r\n" {
                    writer.write_all(b"CLIENT_ERROR bad data chunk\r\n").await?;
                    writer.flush().await?;
                    continue;
                }

                store
                    .lock()
                    .expect("store mutex poisoned")
                    .insert(key.to_owned(), (flags, payload));
                writer.write_all(b"STORED\r\n").await?;
            }
            _ => {
                writer.write_all(b"ERROR\r\n").await?;
            }
        }

        writer.flush().await?;
    }
}
