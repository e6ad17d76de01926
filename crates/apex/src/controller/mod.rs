// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Switching Controller: on each decision tick, extracts the 8-feature
//! vector, asks the ridge bandit for an action, and — for any non-`stay`
//! action — calls `Coordinator.request_switch`, never the Switch Engine
//! directly.

pub mod bandit;
pub mod features;
pub mod ring;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::budget::{episode_scope, BudgetGuard};
use crate::coordinator::Coordinator;
use crate::error::SwitchOutcome;
use crate::router::Router;
use crate::topology::{Role, Topology};

use bandit::{reward, Arm, BanditConfig, RewardInputs, RidgeBandit};
use features::{extract, FeatureInputs, RoleWindow, FEATURE_DIM};

/// Per-tick outcome summary, fed back into the bandit as the reward
/// signal's raw ingredients. The controller does not compute pass rate
/// or token deltas itself — those come from the evaluation harness
/// collaborator, out of this crate's scope — so the caller supplies them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickOutcomeInputs {
    pub phase_advanced: bool,
    pub delta_pass_rate: f64,
    pub delta_tokens: f64,
    pub episode_terminal_success: bool,
    pub sender_role: Option<Role>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchAttempt {
    pub attempted: bool,
    pub committed: bool,
    pub epoch: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub step: u64,
    pub topology_before: Topology,
    pub features: [f64; FEATURE_DIM],
    pub action: &'static str,
    pub epsilon: f64,
    pub decision_ms: f64,
    pub switch: SwitchAttempt,
}

const DEFAULT_LOG_CAPACITY: usize = 10_000;

pub struct ControllerConfig {
    pub episode_id: String,
    pub role_window: usize,
    pub bandit: BanditConfig,
    pub rng_seed: u64,
    pub log_capacity: usize,
}

pub struct Controller {
    router: Router,
    coordinator: Arc<Coordinator>,
    budget: Arc<BudgetGuard>,
    bandit: Mutex<RidgeBandit>,
    rng: Mutex<StdRng>,
    role_window: Mutex<RoleWindow>,
    episode_id: String,
    step: std::sync::atomic::AtomicU64,
    log: Mutex<VecDeque<DecisionRecord>>,
    log_capacity: usize,
}

impl Controller {
    pub fn new(router: Router, coordinator: Arc<Coordinator>, budget: Arc<BudgetGuard>, config: ControllerConfig) -> Self {
        Self {
            router,
            coordinator,
            budget,
            bandit: Mutex::new(RidgeBandit::new(config.bandit)),
            rng: Mutex::new(StdRng::seed_from_u64(config.rng_seed)),
            role_window: Mutex::new(RoleWindow::new(config.role_window)),
            episode_id: config.episode_id,
            step: std::sync::atomic::AtomicU64::new(0),
            log: Mutex::new(VecDeque::new()),
            log_capacity: if config.log_capacity == 0 { DEFAULT_LOG_CAPACITY } else { config.log_capacity },
        }
    }

    /// Run one decision tick: advance dwell/cooldown bookkeeping,
    /// extract features, decide, optionally request a switch, update
    /// the bandit with the resulting reward, and record a
    /// `DecisionRecord`. Returns the record for the caller's own
    /// audit/telemetry use.
    pub async fn tick(&self, outcome_inputs: TickOutcomeInputs) -> DecisionRecord {
        let started = Instant::now();
        self.coordinator.begin_tick();

        {
            let mut window = self.role_window.lock().await;
            window.record(outcome_inputs.sender_role);
        }

        let (topology, _epoch) = self.router.active().await;
        let headroom = self.budget.headroom(&episode_scope(&self.episode_id)).await;
        let inputs = FeatureInputs {
            topology,
            steps_since_switch: self.coordinator.steps_since_switch(),
            dwell_min_steps: self.coordinator.dwell_min_steps(),
            token_headroom: headroom,
        };
        let features = {
            let window = self.role_window.lock().await;
            extract(&inputs, &window)
        };

        let decision = {
            let mut bandit = self.bandit.lock().await;
            let mut rng = self.rng.lock().await;
            bandit.decide(&features, &mut rng)
        };

        let switch = match decision.arm.target_topology() {
            None => SwitchAttempt { attempted: false, committed: false, epoch: None },
            Some(target) if target == topology => SwitchAttempt { attempted: false, committed: false, epoch: None },
            Some(target) => {
                let outcome = self.coordinator.request_switch(topology, target).await;
                match outcome {
                    SwitchOutcome::Committed { epoch } => {
                        SwitchAttempt { attempted: true, committed: true, epoch: Some(epoch) }
                    }
                    _ => SwitchAttempt { attempted: true, committed: false, epoch: None },
                }
            }
        };

        let r = reward(&RewardInputs {
            phase_advanced: outcome_inputs.phase_advanced,
            delta_pass_rate: outcome_inputs.delta_pass_rate,
            delta_tokens: outcome_inputs.delta_tokens,
            switch_committed: switch.committed,
            episode_terminal_success: outcome_inputs.episode_terminal_success,
        });
        {
            let mut bandit = self.bandit.lock().await;
            bandit.update(decision.arm, &features, r);
        }

        let step = self.step.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let record = DecisionRecord {
            step,
            topology_before: topology,
            features,
            action: arm_name(decision.arm),
            epsilon: decision.epsilon,
            decision_ms: started.elapsed().as_secs_f64() * 1000.0,
            switch,
        };

        let mut log = self.log.lock().await;
        log.push_back(record.clone());
        while log.len() > self.log_capacity {
            log.pop_front();
        }
        record
    }

    pub async fn decision_log(&self) -> Vec<DecisionRecord> {
        self.log.lock().await.iter().cloned().collect()
    }
}

fn arm_name(arm: Arm) -> &'static str {
    match arm {
        Arm::Stay => "stay",
        Arm::Star => "star",
        Arm::Chain => "chain",
        Arm::Flat => "flat",
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
