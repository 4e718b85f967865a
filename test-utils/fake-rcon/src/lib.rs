//! Fake game-server remote console for tests.
//!
//! Speaks the length-prefixed little-endian console protocol on
//! `127.0.0.1`, authenticates against a fixed password, records every
//! command it receives and answers through a replaceable handler. The
//! codec here is written independently of `mcops-rcon` on purpose so the
//! client is tested against a second implementation of the framing.
//!
//! Knobs for protocol edge cases:
//! - [`FakeRconServer::set_split_writes`] dribbles responses out a few bytes
//!   at a time so one logical packet spans many TCP reads.
//! - [`FakeRconServer::set_swallow_sentinel`] never answers the end-of-response
//!   marker, which makes the client hit its timeout.

use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::debug;

const TYPE_AUTH: i32 = 3;
const TYPE_AUTH_RESPONSE: i32 = 2;
const TYPE_EXEC: i32 = 2;
const TYPE_RESPONSE: i32 = 0;

/// Maps a command to the payload fragments sent back, one packet each.
pub type Handler = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

type StopHook = Arc<dyn Fn() + Send + Sync>;

struct Shared {
    password: String,
    handler: Mutex<Option<Handler>>,
    on_stop: Mutex<Option<StopHook>>,
    commands: Mutex<Vec<String>>,
    players_online: AtomicU32,
    max_players: AtomicU32,
    connections: AtomicUsize,
    split_writes: Mutex<bool>,
    swallow_sentinel: Mutex<bool>,
}

/// Running fake console. Dropping it stops the accept loop.
pub struct FakeRconServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl FakeRconServer {
    /// Bind an ephemeral port on localhost.
    pub async fn start(password: &str) -> io::Result<Self> {
        Self::start_on(0, password).await
    }

    /// Bind a specific port (0 for ephemeral).
    pub async fn start_on(port: u16, password: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            password: password.to_string(),
            handler: Mutex::new(None),
            on_stop: Mutex::new(None),
            commands: Mutex::new(Vec::new()),
            players_online: AtomicU32::new(0),
            max_players: AtomicU32::new(20),
            connections: AtomicUsize::new(0),
            split_writes: Mutex::new(false),
            swallow_sentinel: Mutex::new(false),
        });

        let accept_shared = shared.clone();
        let task = tokio::spawn(async move {
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                accept_shared.connections.fetch_add(1, Ordering::SeqCst);
                debug!("fake console: connection from {}", peer);
                let conn_shared = accept_shared.clone();
                tokio::spawn(async move {
                    let _ = serve_connection(stream, conn_shared).await;
                });
            }
        });

        Ok(Self { addr, shared, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn password(&self) -> &str {
        &self.shared.password
    }

    /// Replace the default command handler.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&str) -> Vec<String> + Send + Sync + 'static,
    {
        *self.shared.handler.lock() = Some(Arc::new(handler));
    }

    /// Called whenever a `stop` command arrives.
    pub fn on_stop<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.shared.on_stop.lock() = Some(Arc::new(hook));
    }

    pub fn set_players(&self, online: u32, max: u32) {
        self.shared.players_online.store(online, Ordering::SeqCst);
        self.shared.max_players.store(max, Ordering::SeqCst);
    }

    pub fn set_split_writes(&self, enabled: bool) {
        *self.shared.split_writes.lock() = enabled;
    }

    pub fn set_swallow_sentinel(&self, enabled: bool) {
        *self.shared.swallow_sentinel.lock() = enabled;
    }

    /// Every command received so far, in arrival order.
    pub fn commands(&self) -> Vec<String> {
        self.shared.commands.lock().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

impl Drop for FakeRconServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn encode(id: i32, kind: i32, body: &str) -> Vec<u8> {
    let body = body.as_bytes();
    let length = (4 + 4 + body.len() + 2) as i32;
    let mut out = Vec::with_capacity(length as usize + 4);
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(body);
    out.extend_from_slice(&[0, 0]);
    out
}

async fn read_packet(stream: &mut TcpStream) -> io::Result<(i32, i32, String)> {
    let length = stream.read_i32_le().await?;
    if !(10..=4106).contains(&length) {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad length"));
    }
    let mut buf = vec![0u8; length as usize];
    stream.read_exact(&mut buf).await?;
    let id = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let kind = i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let body = String::from_utf8_lossy(&buf[8..buf.len() - 2]).to_string();
    Ok((id, kind, body))
}

fn default_response(shared: &Shared, command: &str) -> Vec<String> {
    match command.split_whitespace().next().unwrap_or("") {
        "list" => vec![format!(
            "There are {} of a max of {} players online: ",
            shared.players_online.load(Ordering::SeqCst),
            shared.max_players.load(Ordering::SeqCst)
        )],
        "stop" => vec!["Stopping the server".to_string()],
        _ => vec![String::new()],
    }
}

async fn write_all(stream: &mut TcpStream, bytes: &[u8], split: bool) -> io::Result<()> {
    if !split {
        stream.write_all(bytes).await?;
        return stream.flush().await;
    }
    for chunk in bytes.chunks(7) {
        stream.write_all(chunk).await?;
        stream.flush().await?;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    Ok(())
}

async fn serve_connection(mut stream: TcpStream, shared: Arc<Shared>) -> io::Result<()> {
    let mut authenticated = false;
    loop {
        let (id, kind, body) = read_packet(&mut stream).await?;
        let split = *shared.split_writes.lock();
        let mut out = Vec::new();

        match kind {
            TYPE_AUTH => {
                // Real servers send an empty response value ahead of the auth reply.
                out.extend(encode(id, TYPE_RESPONSE, ""));
                if body == shared.password {
                    authenticated = true;
                    out.extend(encode(id, TYPE_AUTH_RESPONSE, ""));
                } else {
                    out.extend(encode(-1, TYPE_AUTH_RESPONSE, ""));
                }
            }
            TYPE_EXEC if authenticated => {
                shared.commands.lock().push(body.clone());
                let handler = shared.handler.lock().clone();
                let fragments = match handler {
                    Some(handler) => handler(&body),
                    None => default_response(&shared, &body),
                };
                for fragment in fragments {
                    out.extend(encode(id, TYPE_RESPONSE, &fragment));
                }
                if body.trim() == "stop" {
                    let hook = shared.on_stop.lock().clone();
                    if let Some(hook) = hook {
                        hook();
                    }
                }
            }
            TYPE_EXEC => {
                out.extend(encode(-1, TYPE_AUTH_RESPONSE, ""));
            }
            TYPE_RESPONSE => {
                if *shared.swallow_sentinel.lock() {
                    continue;
                }
                out.extend(encode(id, TYPE_RESPONSE, ""));
            }
            _ => continue,
        }

        write_all(&mut stream, &out, split).await?;
    }
}
