// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic 8-dimensional feature extraction for the Switching
//! Controller. All eight components are O(1) amortized per tick: a
//! one-hot topology read, a dwell-progress ratio, three rolling
//! role-group shares backed by a fixed-size `RingBuffer`, and a budget
//! headroom read. No sort or percentile computation ever runs here.

use crate::controller::ring::RingBuffer;
use crate::topology::{Role, Topology};

pub const FEATURE_DIM: usize = 8;
pub const DEFAULT_ROLE_WINDOW: usize = 5;

fn clip01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Rolling window of the last `W` message senders' roles, used to derive
/// the three role-group share features. `None` entries (external
/// senders, outside the fixed role cycle) count toward the window length
/// but not toward any named share.
pub struct RoleWindow {
    ring: RingBuffer<Option<Role>>,
}

impl RoleWindow {
    pub fn new(window: usize) -> Self {
        Self { ring: RingBuffer::new(window.max(1)) }
    }

    pub fn record(&mut self, sender_role: Option<Role>) {
        self.ring.push(sender_role);
    }

    /// `(planner_share, coder_runner_share, critic_share)` over the
    /// current window. All zero on an empty window.
    pub fn shares(&self) -> (f64, f64, f64) {
        let total = self.ring.len();
        if total == 0 {
            return (0.0, 0.0, 0.0);
        }
        let mut planner = 0u32;
        let mut coder_runner = 0u32;
        let mut critic = 0u32;
        for role in self.ring.iter().flatten() {
            match role {
                Role::Planner => planner += 1,
                Role::Coder | Role::Runner => coder_runner += 1,
                Role::Critic => critic += 1,
                Role::Summarizer => {}
            }
        }
        let total = total as f64;
        (planner as f64 / total, coder_runner as f64 / total, critic as f64 / total)
    }
}

/// Inputs to one feature extraction, gathered by the Controller from the
/// Coordinator, Router, and Budget Guard before each tick.
pub struct FeatureInputs {
    pub topology: Topology,
    pub steps_since_switch: u32,
    pub dwell_min_steps: u32,
    pub token_headroom: f64,
}

pub fn extract(inputs: &FeatureInputs, role_window: &RoleWindow) -> [f64; FEATURE_DIM] {
    let (star, chain, flat) = match inputs.topology {
        Topology::Star => (1.0, 0.0, 0.0),
        Topology::Chain => (0.0, 1.0, 0.0),
        Topology::Flat => (0.0, 0.0, 1.0),
    };
    let dwell_progress = clip01(inputs.steps_since_switch as f64 / inputs.dwell_min_steps.max(1) as f64);
    let (planner_share, coder_runner_share, critic_share) = role_window.shares();
    let headroom = clip01(inputs.token_headroom);

    [star, chain, flat, dwell_progress, planner_share, coder_runner_share, critic_share, headroom]
}

#[cfg(test)]
#[path = "features_tests.rs"]
mod tests;
