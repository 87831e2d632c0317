use covey_core::ParticipantId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct ParticipantEntry {
    heartbeat_expires: Instant,
}

/// The set of participants currently admitted to the session, each with the
/// deadline past which it counts as dead.
///
/// Time is injected by the caller so the registry stays testable without a
/// clock. All access is serialized by the coordinator's mutex one layer up.
#[derive(Debug)]
pub struct Registry {
    entries: HashMap<ParticipantId, ParticipantEntry>,
    lease: Duration,
}

impl Registry {
    pub fn new(heartbeat_period: Duration, heartbeat_timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            lease: heartbeat_period + heartbeat_timeout,
        }
    }

    /// Inserts or replaces `id` with a fresh deadline.
    pub fn add(&mut self, id: ParticipantId, now: Instant) {
        self.entries.insert(
            id,
            ParticipantEntry {
                heartbeat_expires: now + self.lease,
            },
        );
    }

    pub fn remove(&mut self, id: &ParticipantId) {
        self.entries.remove(id);
    }

    /// Pushes the deadline of `id` one lease past `now`.
    ///
    /// Callers must have checked membership; refreshing an absent id is a
    /// no-op.
    pub fn refresh(&mut self, id: &ParticipantId, now: Instant) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.heartbeat_expires = now + self.lease;
        }
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.entries.contains_key(id)
    }

    /// Snapshot of the connected ids.
    pub fn ids(&self) -> Vec<ParticipantId> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest deadline across all entries, the heartbeat monitor's sleep
    /// hint. An empty registry reports one full lease from `now`.
    pub fn next_expiration(&self, now: Instant) -> Instant {
        self.entries
            .values()
            .map(|e| e.heartbeat_expires)
            .min()
            .unwrap_or(now + self.lease)
    }

    /// Ids whose deadline precedes `now`.
    pub fn expired_ids(&self, now: Instant) -> Vec<ParticipantId> {
        self.entries
            .iter()
            .filter(|(_, e)| e.heartbeat_expires < now)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
