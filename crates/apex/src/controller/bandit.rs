// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ε-greedy ridge regression contextual bandit, four arms {stay, star,
//! chain, flat}. Every arm keeps a `[[f64; 8]; 8]` design matrix and an
//! 8-vector, inverted by hand-rolled Gauss-Jordan elimination — no
//! linear-algebra crate appears in this workspace's dependency stack, and
//! the matrices are fixed-size and allocation-free per tick to hold the
//! decision-latency floor. The RNG is always injected
//! (`rand::rngs::StdRng`), never `rand::thread_rng()`, so a bandit run is
//! exactly reproducible given its seed.

use rand::rngs::StdRng;
use rand::Rng;

use crate::controller::features::FEATURE_DIM;
use crate::topology::Topology;

pub const ARM_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arm {
    Stay,
    Star,
    Chain,
    Flat,
}

impl Arm {
    pub const ALL: [Arm; ARM_COUNT] = [Arm::Stay, Arm::Star, Arm::Chain, Arm::Flat];

    fn index(self) -> usize {
        match self {
            Arm::Stay => 0,
            Arm::Star => 1,
            Arm::Chain => 2,
            Arm::Flat => 3,
        }
    }

    /// The topology this arm requests, or `None` for `Stay`.
    pub fn target_topology(self) -> Option<Topology> {
        match self {
            Arm::Stay => None,
            Arm::Star => Some(Topology::Star),
            Arm::Chain => Some(Topology::Chain),
            Arm::Flat => Some(Topology::Flat),
        }
    }
}

type Vector = [f64; FEATURE_DIM];
type Matrix = [[f64; FEATURE_DIM]; FEATURE_DIM];

fn identity_scaled(scale: f64) -> Matrix {
    let mut m = [[0.0; FEATURE_DIM]; FEATURE_DIM];
    for i in 0..FEATURE_DIM {
        m[i][i] = scale;
    }
    m
}

fn add_outer_product(a: &mut Matrix, x: &Vector) {
    for i in 0..FEATURE_DIM {
        for j in 0..FEATURE_DIM {
            a[i][j] += x[i] * x[j];
        }
    }
}

fn mat_vec(a: &Matrix, x: &Vector) -> Vector {
    let mut out = [0.0; FEATURE_DIM];
    for i in 0..FEATURE_DIM {
        let mut sum = 0.0;
        for j in 0..FEATURE_DIM {
            sum += a[i][j] * x[j];
        }
        out[i] = sum;
    }
    out
}

/// Gauss-Jordan inverse of a (well-conditioned, since `A = lambda*I +
/// sum xx^T` with lambda > 0 is always invertible) 8x8 matrix.
fn invert(a: &Matrix) -> Matrix {
    let mut aug = [[0.0; FEATURE_DIM * 2]; FEATURE_DIM];
    for i in 0..FEATURE_DIM {
        for j in 0..FEATURE_DIM {
            aug[i][j] = a[i][j];
        }
        aug[i][FEATURE_DIM + i] = 1.0;
    }

    for col in 0..FEATURE_DIM {
        let mut pivot_row = col;
        let mut pivot_val = aug[col][col].abs();
        for row in (col + 1)..FEATURE_DIM {
            if aug[row][col].abs() > pivot_val {
                pivot_row = row;
                pivot_val = aug[row][col].abs();
            }
        }
        aug.swap(col, pivot_row);

        let pivot = aug[col][col];
        let pivot = if pivot.abs() < 1e-12 { 1e-12 } else { pivot };
        for j in 0..(FEATURE_DIM * 2) {
            aug[col][j] /= pivot;
        }

        for row in 0..FEATURE_DIM {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..(FEATURE_DIM * 2) {
                aug[row][j] -= factor * aug[col][j];
            }
        }
    }

    let mut inv = [[0.0; FEATURE_DIM]; FEATURE_DIM];
    for i in 0..FEATURE_DIM {
        for j in 0..FEATURE_DIM {
            inv[i][j] = aug[i][FEATURE_DIM + j];
        }
    }
    inv
}

struct ArmModel {
    a: Matrix,
    b: Vector,
}

impl ArmModel {
    fn new(lambda: f64) -> Self {
        Self { a: identity_scaled(lambda), b: [0.0; FEATURE_DIM] }
    }

    fn weights(&self) -> Vector {
        mat_vec(&invert(&self.a), &self.b)
    }

    fn update(&mut self, x: &Vector, reward: f64) {
        add_outer_product(&mut self.a, x);
        for i in 0..FEATURE_DIM {
            self.b[i] += reward * x[i];
        }
    }
}

fn dot(a: &Vector, b: &Vector) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// The per-episode decision count at which the ε schedule flattens out.
pub const DEFAULT_EPSILON_SCHEDULE_N: u64 = 5_000;

/// Linear ε schedule: `start` down to `end` over the first `schedule_n`
/// decisions, constant `end` thereafter. A pure function of the global
/// decision count, reproducible given only that count.
pub fn epsilon_for(decisions: u64, start: f64, end: f64, schedule_n: u64) -> f64 {
    if schedule_n == 0 || decisions >= schedule_n {
        return end;
    }
    let progress = decisions as f64 / schedule_n as f64;
    start + (end - start) * progress
}

#[derive(Debug, Clone, Copy)]
pub struct BanditConfig {
    pub lambda: f64,
    pub epsilon_start: f64,
    pub epsilon_end: f64,
    pub epsilon_schedule_n: u64,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self { lambda: 1.0, epsilon_start: 0.20, epsilon_end: 0.05, epsilon_schedule_n: DEFAULT_EPSILON_SCHEDULE_N }
    }
}

pub struct Decision {
    pub arm: Arm,
    pub epsilon: f64,
    pub explored: bool,
}

pub struct RidgeBandit {
    arms: [ArmModel; ARM_COUNT],
    config: BanditConfig,
    decisions: u64,
}

impl RidgeBandit {
    pub fn new(config: BanditConfig) -> Self {
        Self {
            arms: std::array::from_fn(|_| ArmModel::new(config.lambda)),
            config,
            decisions: 0,
        }
    }

    /// Choose an arm for feature vector `x`. `rng` is caller-owned and
    /// caller-seeded; this type never constructs its own randomness
    /// source.
    pub fn decide(&mut self, x: &Vector, rng: &mut StdRng) -> Decision {
        let epsilon = epsilon_for(
            self.decisions,
            self.config.epsilon_start,
            self.config.epsilon_end,
            self.config.epsilon_schedule_n,
        );
        self.decisions += 1;

        let explore = rng.random::<f64>() < epsilon;
        let arm = if explore {
            Arm::ALL[rng.random_range(0..ARM_COUNT)]
        } else {
            self.greedy_arm(x)
        };
        Decision { arm, epsilon, explored: explore }
    }

    fn greedy_arm(&self, x: &Vector) -> Arm {
        let mut best = Arm::ALL[0];
        let mut best_score = f64::NEG_INFINITY;
        for arm in Arm::ALL {
            let score = dot(&self.arms[arm.index()].weights(), x);
            if score > best_score {
                best_score = score;
                best = arm;
            }
        }
        best
    }

    pub fn update(&mut self, arm: Arm, x: &Vector, reward: f64) {
        self.arms[arm.index()].update(x, reward);
    }

    pub fn decisions(&self) -> u64 {
        self.decisions
    }
}

/// Per-tick reward function; constants are fixed and tested, not tunable
/// at runtime.
pub struct RewardInputs {
    pub phase_advanced: bool,
    pub delta_pass_rate: f64,
    pub delta_tokens: f64,
    pub switch_committed: bool,
    pub episode_terminal_success: bool,
}

pub fn reward(inputs: &RewardInputs) -> f64 {
    let mut r = 0.3 * (inputs.phase_advanced as u8 as f64)
        + 0.7 * inputs.delta_pass_rate
        - 1e-4 * inputs.delta_tokens
        - 0.05 * (inputs.switch_committed as u8 as f64);
    if inputs.episode_terminal_success {
        r += 1.0;
    }
    r
}

#[cfg(test)]
#[path = "bandit_tests.rs"]
mod tests;
