//! # mcops Supervisor
//!
//! Lifecycle control for the single game-server process:
//! - Health classification (`ok`, `stale_pid`, `starting`, `process_no_port`,
//!   `port_busy_no_process`, `stopped`)
//! - Start with readiness polling, stop with RCON/SIGTERM/SIGKILL escalation
//! - Gated restart with bounded start retries
//! - Step-by-step incident recovery
//!
//! The [`RestartGate`] lives here because every restart path funnels
//! through the supervisor; the schedulers and the operation registry reach
//! it only through [`ServerOps`].

pub mod breaker;
pub mod config;
pub mod gate;
pub mod ops;
pub mod runtime;
pub mod status;
pub mod supervisor;

// Re-export main types
pub use breaker::CircuitBreaker;
pub use config::{SupervisorConfig, SupervisorTiming};
pub use gate::{AcquireMode, GateConfig, GateRejection, GateSnapshot, RestartGate, RestartPermit};
pub use ops::{RestartRequest, ServerOps};
pub use runtime::{OsRuntime, ServerRuntime};
pub use status::ServerStatus;
pub use supervisor::Supervisor;
