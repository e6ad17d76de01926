// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Switch Engine: the PREPARE -> QUIESCE -> COMMIT/ABORT protocol that
//! moves the Router from one topology/epoch to the next. Grounded on
//! `crates/cli/src/switch.rs`'s capacity-1 `mpsc::Sender<SwitchRequest>`:
//! there, only one switch is ever in flight and later requests displace
//! earlier ones rather than queue. Here that same "only one in flight"
//! discipline is enforced one layer up by the Coordinator's
//! `try_lock`-guarded `switch_lock`; this engine assumes it is only ever
//! driven by one caller at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant as TokioInstant;

use crate::error::AbortReason;
use crate::events::{EventBus, TopologyChanged};
use crate::intent_log::{IntentLog, IntentRecord};
use crate::router::RouterShared;
use crate::topology::Topology;

/// Optional parallel warmup run during PREPARE (e.g. priming a
/// collaborator connection for the target topology's hub). The default
/// is an immediate no-op: the protocol works with zero warmups.
#[async_trait::async_trait]
pub trait TopologyWarmup: Send + Sync {
    async fn prepare(&self, target: Topology) -> bool;
}

pub struct NoopWarmup;

#[async_trait::async_trait]
impl TopologyWarmup for NoopWarmup {
    async fn prepare(&self, _target: Topology) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchExecution {
    Committed { epoch: u64 },
    Aborted { reason: AbortReason },
    /// PREPARE's warmup did not become ready within `prepare_deadline`.
    /// Distinct from Abort: QUIESCE never started, so there is nothing
    /// to re-order, only `buffer_to_next` to unwind.
    PrepareNotReady,
}

pub struct SwitchEngineConfig {
    pub prepare_deadline: Duration,
    pub quiesce_deadline: Duration,
    pub quiesce_poll_interval: Duration,
}

impl Default for SwitchEngineConfig {
    fn default() -> Self {
        Self {
            prepare_deadline: Duration::from_millis(200),
            quiesce_deadline: Duration::from_millis(500),
            quiesce_poll_interval: Duration::from_millis(2),
        }
    }
}

pub struct SwitchEngine {
    router: Arc<RouterShared>,
    warmup: Arc<dyn TopologyWarmup>,
    intent_log: Arc<dyn IntentLog>,
    events: EventBus,
    config: SwitchEngineConfig,
}

impl SwitchEngine {
    pub fn new(
        router: Arc<RouterShared>,
        warmup: Arc<dyn TopologyWarmup>,
        intent_log: Arc<dyn IntentLog>,
        events: EventBus,
        config: SwitchEngineConfig,
    ) -> Self {
        Self { router, warmup, intent_log, events, config }
    }

    /// Run one full switch attempt. Caller (the Coordinator) is
    /// responsible for serializing calls: this method does not itself
    /// guard against concurrent invocation.
    pub async fn execute_switch(&self, from: Topology, target: Topology) -> SwitchExecution {
        self.router.begin_prepare().await;

        // The epoch used for logging/events is the post-commit epoch;
        // read it once before anything can move.
        let prepare_epoch = self.router.current_epoch().await + 1;
        self.intent_log.append(IntentRecord::BeginPrepare { epoch: prepare_epoch, target }).await;

        let ready = tokio::time::timeout(self.config.prepare_deadline, self.warmup.prepare(target))
            .await
            .unwrap_or(false);
        if !ready {
            self.router.abort_switch().await;
            self.intent_log.append(IntentRecord::Abort { epoch: prepare_epoch }).await;
            return SwitchExecution::PrepareNotReady;
        }

        let drained = self.wait_for_quiesce().await;
        if !drained {
            self.router.abort_switch().await;
            self.intent_log.append(IntentRecord::Abort { epoch: prepare_epoch }).await;
            return SwitchExecution::Aborted { reason: AbortReason::QuiesceTimeout };
        }

        let epoch = self.router.commit_switch(target).await;
        self.intent_log.append(IntentRecord::Commit { epoch }).await;
        self.events.publish(TopologyChanged { from, to: target, epoch });
        SwitchExecution::Committed { epoch }
    }

    /// Force an abort for a switch left in flight by a crashed process,
    /// using the recovered epoch from the intent log. `Q_next` (empty,
    /// since nothing survives a process restart without durable queues)
    /// is folded back and `buffer_to_next` cleared.
    pub async fn recover_aborting(&self, interrupted_epoch: u64) {
        self.router.abort_switch().await;
        self.intent_log.append(IntentRecord::Abort { epoch: interrupted_epoch }).await;
    }

    async fn wait_for_quiesce(&self) -> bool {
        let deadline = TokioInstant::now() + self.config.quiesce_deadline;
        loop {
            if self.router.total_active_depth().await == 0 {
                return true;
            }
            if TokioInstant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.config.quiesce_poll_interval).await;
        }
    }
}

#[cfg(test)]
#[path = "switch_engine_tests.rs"]
mod tests;
