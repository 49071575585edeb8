//! Cancellable, resettable expiry timers keyed by id.
//!
//! Timers do not run on their own. The owner polls [`ExpiryTimers::take_due`]
//! with the current time and turns each due entry into a queued event. Every
//! arming gets a fresh generation number, so an expiry that was already
//! queued when its timer was reset or cancelled can be recognised as stale.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
struct TimerEntry {
    deadline: DateTime<Utc>,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct ExpiryTimers {
    entries: HashMap<String, TimerEntry>,
    next_generation: u64,
}

impl ExpiryTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer for `key`. Returns the new generation.
    pub fn arm(&mut self, key: &str, deadline: DateTime<Utc>) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.entries.insert(
            key.to_string(),
            TimerEntry {
                deadline,
                generation,
            },
        );
        generation
    }

    /// Cancel the timer for `key`. Returns whether one was armed.
    pub fn cancel(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }

    pub fn deadline(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.get(key).map(|e| e.deadline)
    }

    /// Remove and return every timer whose deadline is at or before `now`,
    /// earliest first.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<(String, u64)> {
        let mut due: Vec<(String, TimerEntry)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(k, e)| (k.clone(), *e))
            .collect();
        due.sort_by_key(|(_, e)| (e.deadline, e.generation));

        for (key, _) in &due {
            self.entries.remove(key);
        }
        due.into_iter().map(|(k, e)| (k, e.generation)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
