//! # mcops RCON
//!
//! Client for the game server's remote console: a TCP protocol with
//! length-prefixed little-endian packets, a password handshake and
//! multi-packet responses.
//!
//! ```rust,no_run
//! use mcops_rcon::{RconClient, RconConfig};
//!
//! # async fn demo() -> mcops_common::RconResult<()> {
//! let config = RconConfig::from_server_properties("/srv/minecraft/server.properties")?;
//! let mut session = RconClient::connect_with(&config).await?;
//! let players = session.send("list").await?;
//! println!("{}", mcops_rcon::strip_color_codes(&players));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod packet;
pub mod text;

pub use client::{RconClient, DEFAULT_TIMEOUT};
pub use config::{RconConfig, ServerProperties, DEFAULT_GAME_PORT, DEFAULT_RCON_PORT};
pub use packet::Packet;
pub use text::{parse_player_list, strip_color_codes, PlayerCount};
