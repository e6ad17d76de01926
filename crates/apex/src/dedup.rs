// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-recipient TTL + capacity deduplication, keyed by
//! `(episode_id, msg_id)`. A duplicate never drops the *original* message;
//! it only marks the retried copy `redelivered = true` and is itself
//! dropped without raising.

use std::time::{Duration, Instant};

use indexmap::IndexMap;

/// Default dedup entry TTL and default per-recipient capacity, chosen
/// generously relative to `message_ttl_s` so a duplicate arriving within a
/// message's lifetime is always caught.
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_DEDUP_CAPACITY: usize = 50_000;

type DedupKey = (String, String);

/// Dedup entries for a single recipient. Insertion-ordered so capacity
/// eviction drops the oldest entry first.
#[derive(Default)]
pub struct RecipientDedup {
    entries: IndexMap<DedupKey, Instant>,
}

impl RecipientDedup {
    /// Returns `true` if this is a duplicate (already seen and not
    /// expired). As a side effect, records the key as seen (for new keys)
    /// and performs a light TTL + capacity sweep.
    fn check_and_record(&mut self, key: DedupKey, now: Instant, ttl: Duration, capacity: usize) -> bool {
        self.sweep_expired(now, ttl);

        if let Some(seen_at) = self.entries.get(&key) {
            if now.saturating_duration_since(*seen_at) < ttl {
                return true;
            }
        }

        self.entries.insert(key, now);
        while self.entries.len() > capacity {
            self.entries.shift_remove_index(0);
        }
        false
    }

    fn sweep_expired(&mut self, now: Instant, ttl: Duration) {
        self.entries.retain(|_, seen_at| now.saturating_duration_since(*seen_at) < ttl);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Dedup store across all recipients.
pub struct DedupStore {
    per_recipient: IndexMap<String, RecipientDedup>,
    ttl: Duration,
    capacity: usize,
}

impl DedupStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self { per_recipient: IndexMap::new(), ttl, capacity }
    }

    /// Check whether `(episode_id, msg_id)` has already been seen for
    /// `recipient`. Returns `true` (duplicate) or `false` (first sighting,
    /// now recorded).
    pub fn check_and_record(
        &mut self,
        recipient: &str,
        episode_id: &str,
        msg_id: &str,
        now: Instant,
    ) -> bool {
        let bucket = self.per_recipient.entry(recipient.to_owned()).or_default();
        bucket.check_and_record((episode_id.to_owned(), msg_id.to_owned()), now, self.ttl, self.capacity)
    }

    #[cfg(test)]
    fn recipient_len(&self, recipient: &str) -> usize {
        self.per_recipient.get(recipient).map(RecipientDedup::len).unwrap_or(0)
    }
}

impl Default for DedupStore {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_TTL, DEFAULT_DEDUP_CAPACITY)
    }
}

#[cfg(test)]
#[path = "dedup_tests.rs"]
mod tests;
