//! Operator requests that the next tick carries out.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum ManualRequest {
    TriggerNow { reason: String },
    CancelCountdown,
    ClearError,
}

/// Single pending request plus the wake-up for the driver. A newer
/// request replaces an unprocessed older one.
#[derive(Debug, Default)]
pub struct RequestSlot {
    pending: Mutex<Option<ManualRequest>>,
    wake: Arc<Notify>,
}

impl RequestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&self, request: ManualRequest) {
        *self.pending.lock() = Some(request);
        self.wake.notify_one();
    }

    pub fn take(&self) -> Option<ManualRequest> {
        self.pending.lock().take()
    }

    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub fn wake_handle(&self) -> Arc<Notify> {
        self.wake.clone()
    }
}
