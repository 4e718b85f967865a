//! Backup scheduler: on schedule, stops the server, zips its directory,
//! uploads the archive and starts the server again.

mod config;
mod scheduler;
mod state;

pub use config::BackupConfig;
pub use scheduler::BackupScheduler;
pub use state::{BackupState, BackupStatus};
