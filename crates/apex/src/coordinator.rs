// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator: the STABLE -> SWITCHING -> COOLDOWN FSM that gates
//! `request_switch` calls with dwell/cooldown bookkeeping and a
//! single-slot switch lock. Grounded on `crates/cli/src/switch.rs`'s
//! single-switch-in-flight discipline, realized here as a
//! `tokio::sync::Mutex` acquired with `try_lock` rather than awaited:
//! a caller that finds it held does not queue, it defers.

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::{AbortReason, DeferReason, RejectReason, SwitchOutcome};
use crate::switch_engine::{SwitchEngine, SwitchExecution};
use crate::topology::Topology;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    Stable,
    Switching,
    Cooldown,
}

/// Optional pre-switch health check, run before PREPARE with its own
/// short deadline. Unlike the Switch Engine's `TopologyWarmup` (which
/// primes the target), this asks "is it even safe to attempt a switch
/// right now" and is purely advisory: returning `false` defers rather
/// than aborts, since nothing has touched the Router yet.
#[async_trait::async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, target: Topology) -> bool;
}

pub struct AlwaysHealthy;

#[async_trait::async_trait]
impl HealthProbe for AlwaysHealthy {
    async fn check(&self, _target: Topology) -> bool {
        true
    }
}

struct Ticks {
    steps_since_switch: u32,
    cooldown_remaining: u32,
    phase: CoordinatorPhase,
}

pub struct CoordinatorConfig {
    pub dwell_min_steps: u32,
    pub cooldown_steps: u32,
    pub health_probe_deadline: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            dwell_min_steps: 2,
            cooldown_steps: 2,
            health_probe_deadline: Duration::from_millis(20),
        }
    }
}

pub struct Coordinator {
    engine: SwitchEngine,
    health_probe: Box<dyn HealthProbe>,
    config: CoordinatorConfig,
    switch_lock: Mutex<()>,
    ticks: StdMutex<Ticks>,
    pending_target: StdMutex<Option<Topology>>,
}

impl Coordinator {
    pub fn new(engine: SwitchEngine, health_probe: Box<dyn HealthProbe>, config: CoordinatorConfig) -> Self {
        Self {
            engine,
            health_probe,
            config,
            switch_lock: Mutex::new(()),
            ticks: StdMutex::new(Ticks {
                steps_since_switch: 0,
                cooldown_remaining: 0,
                phase: CoordinatorPhase::Stable,
            }),
            pending_target: StdMutex::new(None),
        }
    }

    pub fn phase(&self) -> CoordinatorPhase {
        self.ticks.lock().unwrap_or_else(|e| e.into_inner()).phase
    }

    pub fn steps_since_switch(&self) -> u32 {
        self.ticks.lock().unwrap_or_else(|e| e.into_inner()).steps_since_switch
    }

    pub fn dwell_min_steps(&self) -> u32 {
        self.config.dwell_min_steps
    }

    /// Advance dwell/cooldown bookkeeping by one decision tick. Called
    /// once per Controller decision regardless of whether that decision
    /// requests a switch.
    pub fn begin_tick(&self) {
        let mut ticks = self.ticks.lock().unwrap_or_else(|e| e.into_inner());
        ticks.steps_since_switch = ticks.steps_since_switch.saturating_add(1);
        if ticks.cooldown_remaining > 0 {
            ticks.cooldown_remaining -= 1;
            if ticks.cooldown_remaining == 0 {
                ticks.phase = CoordinatorPhase::Stable;
            }
        }
    }

    /// The most recent target recorded while the switch lock was held by
    /// another call (single-slot, latest-wins). Not auto-applied; a
    /// caller may inspect and re-request it on a later tick.
    pub fn pending_target(&self) -> Option<Topology> {
        *self.pending_target.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn request_switch(&self, from: Topology, target: Topology) -> SwitchOutcome {
        let guard = match self.switch_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                *self.pending_target.lock().unwrap_or_else(|e| e.into_inner()) = Some(target);
                return SwitchOutcome::Deferred { reason: DeferReason::InFlight };
            }
        };

        {
            let ticks = self.ticks.lock().unwrap_or_else(|e| e.into_inner());
            if ticks.steps_since_switch < self.config.dwell_min_steps {
                return SwitchOutcome::Rejected { reason: RejectReason::Dwell };
            }
            if ticks.phase == CoordinatorPhase::Cooldown {
                return SwitchOutcome::Rejected { reason: RejectReason::Cooldown };
            }
        }

        let healthy = tokio::time::timeout(self.config.health_probe_deadline, self.health_probe.check(target))
            .await
            .unwrap_or(false);
        if !healthy {
            let mut ticks = self.ticks.lock().unwrap_or_else(|e| e.into_inner());
            ticks.phase = CoordinatorPhase::Cooldown;
            ticks.cooldown_remaining = self.config.cooldown_steps;
            return SwitchOutcome::Deferred { reason: DeferReason::Health };
        }

        {
            let mut ticks = self.ticks.lock().unwrap_or_else(|e| e.into_inner());
            ticks.phase = CoordinatorPhase::Switching;
        }

        let execution = self.engine.execute_switch(from, target).await;
        drop(guard);

        let mut ticks = self.ticks.lock().unwrap_or_else(|e| e.into_inner());
        match execution {
            SwitchExecution::Committed { epoch } => {
                ticks.phase = CoordinatorPhase::Cooldown;
                ticks.cooldown_remaining = self.config.cooldown_steps;
                ticks.steps_since_switch = 0;
                SwitchOutcome::Committed { epoch }
            }
            SwitchExecution::Aborted { reason } => {
                ticks.phase = CoordinatorPhase::Stable;
                SwitchOutcome::Aborted { reason }
            }
            SwitchExecution::PrepareNotReady => {
                ticks.phase = CoordinatorPhase::Stable;
                SwitchOutcome::Aborted { reason: AbortReason::PrepareTimeout }
            }
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
