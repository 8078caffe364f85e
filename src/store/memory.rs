//! In-process counter store.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::{BucketCounts, CounterStore};
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u64,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A counter store held in process memory.
///
/// Same semantics as the networked store, scoped to one process. Bucket
/// keys are never read again once they expire, so increments periodically
/// sweep expired entries out of the map.
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    /// Earliest time the next sweep may run
    next_sweep: Mutex<Instant>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Live count stored under a key, if any.
    pub fn get(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.count)
    }

    /// Number of keys currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop expired entries if the sweep is due.
    ///
    /// The next sweep is scheduled half of the shortest expiry seen since
    /// the last one, so an entry outlives its expiry by at most that much.
    fn sweep_expired(&self, now: Instant, expiry: Duration) {
        {
            let mut next_sweep = self.next_sweep.lock();
            if now < *next_sweep {
                *next_sweep = (*next_sweep).min(now + expiry / 2);
                return;
            }
            *next_sweep = now + expiry / 2;
        }

        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Swept expired in-memory counters");
        }
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment(
        &self,
        current_key: &str,
        previous_key: &str,
        expiry: Duration,
    ) -> Result<BucketCounts> {
        let now = Instant::now();
        self.sweep_expired(now, expiry);

        // Read the previous bucket first; holding a map guard across the
        // entry() call below could deadlock on a shared shard.
        let previous = self.get(previous_key).unwrap_or(0);

        let current = {
            let mut entry = self
                .entries
                .entry(current_key.to_string())
                .or_insert(Entry {
                    count: 0,
                    expires_at: now + expiry,
                });
            if !entry.is_live(now) {
                *entry = Entry {
                    count: 0,
                    expires_at: now + expiry,
                };
            }
            entry.count += 1;
            entry.count
        };

        trace!(key = %current_key, current, previous, "Incremented in-memory counter");

        Ok(BucketCounts { current, previous })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
