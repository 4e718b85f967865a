//! Cross-crate scenarios for mcops.
//!
//! Everything above the OS seam is real: supervisor, restart gate,
//! operation registry, schedulers and console tail. Below it a
//! [`SimulatedHost`] stands in for the JVM. It answers the remote console
//! over real TCP through `fake-rcon` and writes a `logs/latest.log` the
//! way a server does.

pub mod assertions;
pub mod host;
pub mod stack;

pub use host::SimulatedHost;
pub use stack::Stack;
