// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Message` value type: envelope fields, retry/attempt state, and the
//! topology-epoch stamp. Ownership of a `Message` is strictly the
//! Router's between `route` and `dequeue` — never a loose, optional-field
//! dataclass shared across components.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DropReason;

/// Hard cap on serialized payload size, enforced at construction.
pub const PAYLOAD_MAX_BYTES: usize = 512 * 1024;

/// Default message time-to-live when `expires_ts` is not set explicitly.
pub const DEFAULT_MESSAGE_TTL: Duration = Duration::from_secs(60);

/// Default retry ceiling.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Distinguished recipient meaning "all agents".
pub const BROADCAST: &str = "__broadcast__";

/// Opaque payload, size-checked at construction so an oversized payload
/// can never enter the queue system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Build a payload, rejecting it if its serialized size exceeds
    /// `payload_max_bytes`.
    pub fn try_new(fields: Map<String, Value>, payload_max_bytes: usize) -> Result<Self, DropReason> {
        let estimated = serde_json::to_vec(&fields).map(|v| v.len()).unwrap_or(usize::MAX);
        if estimated > payload_max_bytes {
            return Err(DropReason::InvalidPayload);
        }
        Ok(Self(fields))
    }

    pub fn empty() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// `forward_to` hint set by the Router when rewriting a message to the
    /// Star-topology hub.
    pub fn forward_to(&self) -> Option<&str> {
        self.0.get("forward_to").and_then(Value::as_str)
    }
}

/// One of the three fixed priority classes. Unused by the FIFO-only
/// router; reserved for a future DRR/WRED scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Final,
    Draft,
    Critic,
}

/// A message in flight between agents. Senders supply a provisional
/// `topo_epoch`; the Router authoritatively overwrites it at ingress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub episode_id: String,
    pub msg_id: String,
    pub sender: String,
    pub recipient: String,
    pub topo_epoch: u64,
    pub priority: Priority,
    pub payload: Payload,
    pub attempt: u32,
    #[serde(skip, default = "Instant::now")]
    pub created_ts: Instant,
    #[serde(skip, default = "Instant::now")]
    pub expires_ts: Instant,
    pub redelivered: bool,
    pub drop_reason: Option<DropReason>,
}

impl Message {
    /// Construct a new message addressed to one recipient, carrying the
    /// caller-supplied `msg_id`. The Router is the caller for every
    /// `Message` ever built: it passes through a producer's own id on the
    /// single-recipient path, or mints a fresh one per copy for a Flat
    /// fan-out, but never invents an id on behalf of a direct delivery —
    /// that would defeat dedup against a genuine producer resubmission.
    pub fn new(
        episode_id: impl Into<String>,
        msg_id: impl Into<String>,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        payload: Payload,
        ttl: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            episode_id: episode_id.into(),
            msg_id: msg_id.into(),
            sender: sender.into(),
            recipient: recipient.into(),
            topo_epoch: 0,
            priority: Priority::Final,
            payload,
            attempt: 0,
            created_ts: now,
            expires_ts: now + ttl,
            redelivered: false,
            drop_reason: None,
        }
    }

    pub fn dedup_key(&self) -> (String, String) {
        (self.episode_id.clone(), self.msg_id.clone())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_ts
    }

    /// Mark this message as a retry: `attempt += 1`, `redelivered = true`.
    /// `(episode_id, msg_id)` is preserved, so a retried message still
    /// dedups against the delivery it is replacing.
    pub fn mark_retried(&mut self) {
        self.attempt += 1;
        self.redelivered = true;
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
