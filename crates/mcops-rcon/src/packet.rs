//! Wire format of the remote console protocol.
//!
//! ```text
//! +-----------+------------+----------+-----------------+-------+
//! | length i32| request id | type i32 | payload (UTF-8) | 00 00 |
//! +-----------+------------+----------+-----------------+-------+
//!   little-endian; length counts everything after itself
//! ```

use mcops_common::{RconError, RconResult};
use tokio::io::{AsyncRead, AsyncReadExt};

pub const SERVERDATA_AUTH: i32 = 3;
pub const SERVERDATA_AUTH_RESPONSE: i32 = 2;
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// Largest payload a single response packet may carry.
pub const MAX_PAYLOAD_SIZE: usize = 4096;

/// Bytes counted by `length` besides the payload: id, type and two NULs.
const HEADER_OVERHEAD: usize = 4 + 4 + 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub request_id: i32,
    pub packet_type: i32,
    pub payload: String,
}

impl Packet {
    pub fn new(request_id: i32, packet_type: i32, payload: impl Into<String>) -> Self {
        Self {
            request_id,
            packet_type,
            payload: payload.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let body = self.payload.as_bytes();
        let length = (HEADER_OVERHEAD + body.len()) as i32;

        let mut out = Vec::with_capacity(4 + length as usize);
        out.extend_from_slice(&length.to_le_bytes());
        out.extend_from_slice(&self.request_id.to_le_bytes());
        out.extend_from_slice(&self.packet_type.to_le_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(&[0, 0]);
        out
    }

    /// Read exactly one packet. The reader may deliver it in any number of
    /// chunks; `read_exact` keeps pulling until the declared length is in.
    pub async fn read_from<R>(reader: &mut R) -> RconResult<Packet>
    where
        R: AsyncRead + Unpin,
    {
        let length = reader.read_i32_le().await.map_err(io_to_rcon)?;
        if length < HEADER_OVERHEAD as i32 || length as usize > MAX_PAYLOAD_SIZE + HEADER_OVERHEAD {
            return Err(RconError::fragment(format!("invalid packet length {}", length)));
        }

        let mut buf = vec![0u8; length as usize];
        reader.read_exact(&mut buf).await.map_err(io_to_rcon)?;

        let request_id = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let packet_type = i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);

        let mut body = &buf[8..];
        // Payload is terminated by two NULs; tolerate servers that send one.
        while let Some((&0, rest)) = body.split_last() {
            body = rest;
        }

        Ok(Packet {
            request_id,
            packet_type,
            payload: String::from_utf8_lossy(body).into_owned(),
        })
    }
}

fn io_to_rcon(err: std::io::Error) -> RconError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        RconError::connection("peer", "connection closed mid-packet")
    } else {
        RconError::connection("peer", err)
    }
}
