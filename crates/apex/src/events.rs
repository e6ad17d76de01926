// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topology-change notifications, fanned out to observers (the
//! observability surface, and any in-process subscriber) via a
//! broadcast channel. Lagging subscribers drop old events rather than
//! block the Switch Engine; a missed `TopologyChanged` is recoverable
//! by reading `Router::active()`.

use tokio::sync::broadcast;

use crate::topology::Topology;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyChanged {
    pub from: Topology,
    pub to: Topology,
    pub epoch: u64,
}

const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TopologyChanged>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TopologyChanged> {
        self.sender.subscribe()
    }

    /// Publish a change. Ignores the "no subscribers" error: nobody
    /// listening is not a fault.
    pub fn publish(&self, event: TopologyChanged) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
