//! Reboot scheduler: restarts the server when it has been empty for too
//! long or has been up for too long.

mod config;
mod scheduler;
mod state;

pub use config::RebootConfig;
pub use scheduler::{RebootScheduler, RESTART_SOURCE};
pub use state::{RebootState, RebootStatus, RebootTrigger};
