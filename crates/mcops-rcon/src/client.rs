//! Authenticated remote console session.
//!
//! A [`RconClient`] owns one TCP connection. It is created by
//! [`RconClient::connect`], which performs the authentication handshake
//! before returning, so holding a client means the session is logged in.
//! [`RconClient::send`] takes `&mut self`, so a second request can't be
//! issued on the same session while one is outstanding.
//!
//! # Multi-packet responses
//!
//! Long responses are split by the server into several packets that share
//! the request id. There is no "last fragment" flag, so after each command
//! the client sends an empty `RESPONSE_VALUE` packet with its own id. The
//! server answers in order, so every fragment of the command has arrived
//! once the sentinel id comes back.
//!
//! No error is retried here. Retry policy belongs to the caller.

use crate::config::RconConfig;
use crate::packet::{
    Packet, SERVERDATA_AUTH, SERVERDATA_AUTH_RESPONSE, SERVERDATA_EXECCOMMAND,
    SERVERDATA_RESPONSE_VALUE,
};
use mcops_common::{RconError, RconResult};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default per-call timeout (connect, authenticate, and each send).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on fragments accepted for a single response.
const MAX_FRAGMENTS: usize = 256;

pub struct RconClient {
    addr: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_id: i32,
    timeout: Duration,
}

impl std::fmt::Debug for RconClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RconClient")
            .field("addr", &self.addr)
            .field("next_id", &self.next_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RconClient {
    /// Open a connection and authenticate.
    ///
    /// Returns [`RconError::Auth`] for a rejected password, which is never
    /// conflated with [`RconError::Connection`] or [`RconError::Timeout`].
    pub async fn connect(
        host: &str,
        port: u16,
        password: &str,
        call_timeout: Duration,
    ) -> RconResult<Self> {
        let addr = format!("{}:{}", host, port);

        let stream = match timeout(call_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(RconError::connection(&addr, e)),
            Err(_) => return Err(RconError::timeout("connect", call_timeout)),
        };
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = stream.into_split();
        let mut client = Self {
            addr,
            reader: BufReader::new(read_half),
            writer: write_half,
            next_id: 0,
            timeout: call_timeout,
        };

        match timeout(call_timeout, client.authenticate(password)).await {
            Ok(result) => result?,
            Err(_) => return Err(RconError::timeout("authenticate", call_timeout)),
        }

        debug!("Remote console session established: {}", client.addr);
        Ok(client)
    }

    /// Connect using a [`RconConfig`]; fails with `NotConfigured` when the
    /// console is disabled or has no password.
    pub async fn connect_with(config: &RconConfig) -> RconResult<Self> {
        config.ensure_usable()?;
        Self::connect(&config.host, config.port, &config.password, config.timeout).await
    }

    /// Connect, run one command, and close.
    pub async fn execute_once(config: &RconConfig, command: &str) -> RconResult<String> {
        let mut client = Self::connect_with(config).await?;
        client.send(command).await
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn next_request_id(&mut self) -> i32 {
        // Positive ids only: -1 is the server's auth-failure marker.
        self.next_id = if self.next_id >= i32::MAX - 1 { 1 } else { self.next_id + 1 };
        self.next_id
    }

    async fn write_packet(&mut self, packet: &Packet) -> RconResult<()> {
        self.writer
            .write_all(&packet.encode())
            .await
            .map_err(|e| RconError::connection(&self.addr, e))
    }

    async fn read_packet(&mut self) -> RconResult<Packet> {
        Packet::read_from(&mut self.reader).await.map_err(|e| match e {
            RconError::Connection { reason, .. } => RconError::Connection {
                addr: self.addr.clone(),
                reason,
            },
            other => other,
        })
    }

    async fn authenticate(&mut self, password: &str) -> RconResult<()> {
        let id = self.next_request_id();
        self.write_packet(&Packet::new(id, SERVERDATA_AUTH, password)).await?;

        loop {
            let packet = self.read_packet().await?;
            if packet.request_id == -1 {
                warn!("Remote console rejected credentials: {}", self.addr);
                return Err(RconError::auth(&self.addr));
            }
            // Some servers emit an empty RESPONSE_VALUE before the auth reply.
            if packet.packet_type == SERVERDATA_RESPONSE_VALUE {
                continue;
            }
            if packet.packet_type == SERVERDATA_AUTH_RESPONSE && packet.request_id == id {
                return Ok(());
            }
            return Err(RconError::fragment(format!(
                "unexpected auth reply (id {}, type {})",
                packet.request_id, packet.packet_type
            )));
        }
    }

    /// Send a command and return the full, reassembled response.
    pub async fn send(&mut self, command: &str) -> RconResult<String> {
        let call_timeout = self.timeout;
        match timeout(call_timeout, self.send_inner(command)).await {
            Ok(result) => result,
            Err(_) => Err(RconError::timeout("send", call_timeout)),
        }
    }

    async fn send_inner(&mut self, command: &str) -> RconResult<String> {
        let command_id = self.next_request_id();
        let sentinel_id = self.next_request_id();

        let mut bytes = Packet::new(command_id, SERVERDATA_EXECCOMMAND, command).encode();
        bytes.extend(Packet::new(sentinel_id, SERVERDATA_RESPONSE_VALUE, "").encode());
        self.writer
            .write_all(&bytes)
            .await
            .map_err(|e| RconError::connection(&self.addr, e))?;

        let mut response = String::new();
        let mut fragments = 0usize;
        loop {
            let packet = self.read_packet().await?;

            if packet.request_id == sentinel_id {
                break;
            }
            if packet.request_id == -1 {
                return Err(RconError::auth(&self.addr));
            }
            if packet.request_id != command_id {
                return Err(RconError::fragment(format!(
                    "response id {} matches neither command {} nor sentinel {}",
                    packet.request_id, command_id, sentinel_id
                )));
            }

            fragments += 1;
            if fragments > MAX_FRAGMENTS {
                return Err(RconError::fragment("response exceeded fragment limit"));
            }
            response.push_str(&packet.payload);
        }

        debug!(
            "Remote console command complete: {:?} ({} fragment(s), {} bytes)",
            command,
            fragments,
            response.len()
        );
        Ok(response)
    }
}
