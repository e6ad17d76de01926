// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead intent log for the switch protocol. Durable persistence
//! is a collaborator concern the core does not mandate; the default
//! in-memory implementation exists so crash recovery can be exercised
//! and tested without wiring a real store.

use async_trait::async_trait;

use crate::topology::Topology;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentRecord {
    BeginPrepare { epoch: u64, target: Topology },
    Commit { epoch: u64 },
    Abort { epoch: u64 },
}

#[async_trait]
pub trait IntentLog: Send + Sync {
    async fn append(&self, record: IntentRecord);
    /// The last record written, if any. Used at startup to detect an
    /// interrupted switch: a `BeginPrepare` with no following `Commit`
    /// or `Abort` for the same epoch means the prior process crashed
    /// mid-switch.
    async fn last(&self) -> Option<IntentRecord>;
}

#[derive(Default)]
pub struct InMemoryIntentLog {
    records: tokio::sync::Mutex<Vec<IntentRecord>>,
}

#[async_trait]
impl IntentLog for InMemoryIntentLog {
    async fn append(&self, record: IntentRecord) {
        self.records.lock().await.push(record);
    }

    async fn last(&self) -> Option<IntentRecord> {
        self.records.lock().await.last().cloned()
    }
}

/// Given the last-written intent record, decide whether a crash left a
/// switch in flight. Returns the epoch that needs a forced ABORT, if any.
pub fn crash_recovery_epoch(last: Option<&IntentRecord>) -> Option<u64> {
    match last {
        Some(IntentRecord::BeginPrepare { epoch, .. }) => Some(*epoch),
        _ => None,
    }
}

#[cfg(test)]
#[path = "intent_log_tests.rs"]
mod tests;
