//! Idempotency cache.
//!
//! Check-and-create happens under one lock, so two concurrent requests with
//! the same key can never both become the executing one.

use crate::outcome::OperationOutcome;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
enum EntryState {
    Running,
    Done(OperationOutcome),
}

#[derive(Debug, Clone)]
struct Entry {
    state: EntryState,
    expires_at: DateTime<Utc>,
}

/// Result of [`IdempotencyCache::begin`].
#[derive(Debug)]
pub enum Admission {
    /// First request for this key; finish the ticket when done.
    Fresh(IdempotencyTicket),
    InProgress,
    Replay(OperationOutcome),
}

#[derive(Debug, Clone)]
pub struct IdempotencyCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    ttl: Duration,
}

impl IdempotencyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub fn cache_key(op_key: &str, actor: &str, idempotency_key: &str) -> String {
        format!("{}:{}:{}", op_key, actor, idempotency_key)
    }

    pub fn begin(&self, cache_key: &str) -> Admission {
        self.begin_at(cache_key, Utc::now())
    }

    pub fn begin_at(&self, cache_key: &str, now: DateTime<Utc>) -> Admission {
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.expires_at > now);

        if let Some(entry) = entries.get(cache_key) {
            debug!("Idempotency hit for {}", cache_key);
            return match &entry.state {
                EntryState::Running => Admission::InProgress,
                EntryState::Done(result) => Admission::Replay(result.clone()),
            };
        }

        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero());
        entries.insert(
            cache_key.to_string(),
            Entry {
                state: EntryState::Running,
                expires_at: now + ttl,
            },
        );
        Admission::Fresh(IdempotencyTicket {
            cache: self.clone(),
            cache_key: cache_key.to_string(),
            finished: false,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ownership of a `Running` entry.
///
/// Dropping an unfinished ticket removes the entry, so a cancelled request
/// does not block its key until the TTL runs out.
#[derive(Debug)]
pub struct IdempotencyTicket {
    cache: IdempotencyCache,
    cache_key: String,
    finished: bool,
}

impl IdempotencyTicket {
    pub fn finish(mut self, result: OperationOutcome) {
        self.finished = true;
        let mut entries = self.cache.entries.lock();
        if let Some(entry) = entries.get_mut(&self.cache_key) {
            entry.state = EntryState::Done(result);
        }
    }
}

impl Drop for IdempotencyTicket {
    fn drop(&mut self) {
        if !self.finished {
            self.cache.entries.lock().remove(&self.cache_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{ExecutionOutcome, OperationOutcome};

    fn result() -> OperationOutcome {
        let execution = ExecutionOutcome {
            success: true,
            message: Some("done".into()),
            ..Default::default()
        };
        OperationOutcome::from_execution("op-1".into(), "server:start", execution, 12)
    }

    #[test]
    fn test_running_then_done() {
        let cache = IdempotencyCache::new(Duration::from_secs(900));
        let key = IdempotencyCache::cache_key("server:start", "alice", "abc");

        let Admission::Fresh(ticket) = cache.begin(&key) else {
            panic!("first request must be fresh");
        };
        assert!(matches!(cache.begin(&key), Admission::InProgress));

        ticket.finish(result());
        match cache.begin(&key) {
            Admission::Replay(cached) => assert_eq!(cached, result()),
            other => panic!("expected replay, got {:?}", other),
        }
    }

    #[test]
    fn test_entries_expire() {
        let cache = IdempotencyCache::new(Duration::from_secs(900));
        let t0 = Utc::now();
        let Admission::Fresh(ticket) = cache.begin_at("k", t0) else {
            panic!("fresh");
        };
        ticket.finish(result());

        let later = t0 + chrono::Duration::seconds(901);
        assert!(matches!(cache.begin_at("k", later), Admission::Fresh(_)));
    }

    #[test]
    fn test_dropped_ticket_frees_key() {
        let cache = IdempotencyCache::new(Duration::from_secs(900));
        {
            let _admission = cache.begin("k");
        }
        assert!(cache.is_empty());
        assert!(matches!(cache.begin("k"), Admission::Fresh(_)));
    }
}
