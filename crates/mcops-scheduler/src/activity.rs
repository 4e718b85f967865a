//! Coordination between the two schedulers.
//!
//! Each scheduler publishes its current state on a watch channel. Before a
//! scheduler leaves `monitoring` for a countdown or a restart it *claims*:
//! it publishes the busy state first and only then reads the peer. If the
//! peer is busy too, the claim is rolled back. Two schedulers claiming at
//! the same moment may both back off, but they can never both proceed.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    Reboot,
    Backup,
}

impl SchedulerKind {
    pub fn peer(&self) -> Self {
        match self {
            Self::Reboot => Self::Backup,
            Self::Backup => Self::Reboot,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reboot => "reboot",
            Self::Backup => "backup",
        }
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published state of one scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activity {
    pub state: String,
    /// `disabled` or `monitoring`: the peer may act.
    pub quiet: bool,
}

impl Activity {
    fn quiet(state: &str) -> Self {
        Self {
            state: state.to_string(),
            quiet: true,
        }
    }
}

/// Shared between both schedulers. Cloning shares the channels.
#[derive(Debug, Clone)]
pub struct ActivityBoard {
    reboot: watch::Sender<Activity>,
    backup: watch::Sender<Activity>,
}

impl Default for ActivityBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityBoard {
    pub fn new() -> Self {
        let (reboot, _) = watch::channel(Activity::quiet("disabled"));
        let (backup, _) = watch::channel(Activity::quiet("disabled"));
        Self { reboot, backup }
    }

    fn sender(&self, kind: SchedulerKind) -> &watch::Sender<Activity> {
        match kind {
            SchedulerKind::Reboot => &self.reboot,
            SchedulerKind::Backup => &self.backup,
        }
    }

    pub fn publish(&self, kind: SchedulerKind, state: &str, quiet: bool) {
        self.sender(kind).send_if_modified(|current| {
            if current.state == state && current.quiet == quiet {
                return false;
            }
            current.state = state.to_string();
            current.quiet = quiet;
            true
        });
    }

    pub fn current(&self, kind: SchedulerKind) -> Activity {
        self.sender(kind).borrow().clone()
    }

    pub fn subscribe(&self, kind: SchedulerKind) -> watch::Receiver<Activity> {
        self.sender(kind).subscribe()
    }

    /// Publish `state` as busy for `kind` unless the peer is busy.
    /// On conflict the previous activity is restored and the peer's
    /// activity returned.
    pub fn try_claim(&self, kind: SchedulerKind, state: &str) -> Result<(), Activity> {
        let previous = self.sender(kind).send_replace(Activity {
            state: state.to_string(),
            quiet: false,
        });

        let peer = self.current(kind.peer());
        if peer.quiet {
            debug!("{} scheduler claimed {}", kind, state);
            return Ok(());
        }

        self.sender(kind).send_replace(previous);
        debug!("{} scheduler yielded: {} is {}", kind, kind.peer(), peer.state);
        Err(peer)
    }
}
