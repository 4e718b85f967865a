//! # mcops Console
//!
//! Follows the game server's console log (`logs/latest.log`) for live
//! views: polls the file, survives rotation, strips color codes, keeps the
//! newest entries in memory and fans them out to subscribers.

pub mod history;
pub mod tail;
pub mod types;

pub use history::{load_history, save_history};
pub use tail::{ConsoleTail, TailConfig};
pub use types::{is_noise, ConsoleEntry, Marker, TailStatus, NOISE_PATTERNS};
