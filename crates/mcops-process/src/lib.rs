//! # mcops Process
//!
//! Low-level process operations for the supervised game server:
//! - PID file persistence
//! - Existence checks and command-line identification
//! - Launching the start script detached
//! - Signal delivery
//!
//! Only the supervisor calls into this crate; nothing else touches the OS
//! process or the PID file directly.

pub mod check;
pub mod launch;
pub mod pid_file;
pub mod terminate;

// Re-export main types
pub use check::{process_exists, ProcessInfo, ProcessInspector};
pub use launch::spawn_detached;
pub use pid_file::{PidFile, PidFileState};
pub use terminate::{force_kill, send_signal, terminate_gracefully, StopSignal};
