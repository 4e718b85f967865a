//! # mcops Scheduler
//!
//! Two unattended maintenance loops for the game server:
//! - [`RebootScheduler`]: restarts an empty server after a while, and a
//!   long-running one after a countdown that warns the players
//! - [`BackupScheduler`]: at a set time of day, stops the server, zips its
//!   directory, uploads the archive and starts the server again
//!
//! Every lifecycle action goes through the operation registry with a
//! scheduler actor, so the restart gate and the trace see them like any
//! operator request. The two schedulers never run a cycle at the same time;
//! they coordinate through an [`ActivityBoard`].
//!
//! Each scheduler persists its config, status and action log as JSON so a
//! daemon restart picks up where it left off. [`SchedulerDriver`] runs one
//! tick loop per scheduler.

pub mod action_log;
pub mod activity;
pub mod archive;
pub mod backup;
pub mod config;
pub mod driver;
pub mod reboot;
pub mod request;
pub mod storage;
pub mod store;
pub mod warnings;

pub use action_log::{ActionLog, ActionLogEntry, EntryStatus};
pub use activity::{Activity, ActivityBoard, SchedulerKind};
pub use backup::{BackupConfig, BackupScheduler, BackupState, BackupStatus};
pub use config::{SchedulerPaths, SchedulerSettings, SchedulerTiming, StorageSettings};
pub use driver::{Scheduler, SchedulerDriver};
pub use reboot::{RebootConfig, RebootScheduler, RebootState, RebootStatus, RebootTrigger};
pub use request::ManualRequest;
pub use storage::{DirectoryStorage, RemoteObject, RemoteStorage};
