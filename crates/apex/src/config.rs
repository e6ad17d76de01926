// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime configuration, following the `clap::Parser` + `env = "..."`
//! pattern from `crates/mux/src/config.rs`.

use std::collections::HashMap;
use std::time::Duration;

/// Coordination-core configuration. One process, one instance.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "apex", about = "Single-host multi-agent coordination runtime")]
pub struct ApexConfig {
    /// Host to bind the observability surface on.
    #[arg(long, default_value = "127.0.0.1", env = "APEX_HOST")]
    pub host: String,

    /// Port for `/metrics` and `/healthz`.
    #[arg(long, default_value_t = 8780, env = "APEX_PORT")]
    pub port: u16,

    /// Agent id treated as the Star-topology hub.
    #[arg(long, default_value = "planner", env = "APEX_HUB")]
    pub hub: String,

    /// Topology to start in.
    #[arg(long, default_value = "chain", env = "APEX_INITIAL_TOPOLOGY")]
    pub initial_topology: String,

    /// QUIESCE max wait, in milliseconds.
    #[arg(long, default_value_t = 50, env = "APEX_QUIESCE_DEADLINE_MS")]
    pub quiesce_deadline_ms: u64,

    /// PREPARE sub-task max wait, in milliseconds.
    #[arg(long, default_value_t = 20, env = "APEX_PREPARE_DEADLINE_MS")]
    pub prepare_deadline_ms: u64,

    /// Minimum decision ticks in the current topology before a switch
    /// is accepted.
    #[arg(long, default_value_t = 2, env = "APEX_DWELL_MIN_STEPS")]
    pub dwell_min_steps: u32,

    /// Decision ticks after a committed switch during which a new
    /// switch is rejected.
    #[arg(long, default_value_t = 2, env = "APEX_COOLDOWN_STEPS")]
    pub cooldown_steps: u32,

    /// Health-probe deadline before a switch attempt, in milliseconds.
    #[arg(long, default_value_t = 20, env = "APEX_HEALTH_PROBE_DEADLINE_MS")]
    pub health_probe_deadline_ms: u64,

    /// Per-recipient queue bound (each of Q_active and Q_next).
    #[arg(long, default_value_t = 10_000, env = "APEX_QUEUE_CAPACITY_PER_RECEIVER")]
    pub queue_capacity_per_receiver: usize,

    /// Default message TTL, in seconds, applied when `expires_ts` is
    /// not set explicitly.
    #[arg(long, default_value_t = 60, env = "APEX_MESSAGE_TTL_S")]
    pub message_ttl_s: u64,

    /// Retry ceiling before a message is dropped with `max_attempts`.
    #[arg(long, default_value_t = 5, env = "APEX_MAX_ATTEMPTS")]
    pub max_attempts: u32,

    /// Hard payload size guard, in bytes.
    #[arg(long, default_value_t = 524_288, env = "APEX_PAYLOAD_MAX_BYTES")]
    pub payload_max_bytes: usize,

    /// Budget headroom multiplier applied to every reservation estimate.
    #[arg(long, default_value_t = 1.2, env = "APEX_SAFETY_FACTOR")]
    pub safety_factor: f64,

    /// Budget reservation max hold before it is expired and debited, in
    /// seconds.
    #[arg(long, default_value_t = 10, env = "APEX_RESERVATION_TTL_S")]
    pub reservation_ttl_s: u64,

    /// Interval between Budget Guard expiry sweeps, in milliseconds.
    #[arg(long, default_value_t = 1_000, env = "APEX_BUDGET_SWEEP_INTERVAL_MS")]
    pub budget_sweep_interval_ms: u64,

    /// Daily token budget (scope `daily`). Zero disables the scope.
    #[arg(long, default_value_t = 0, env = "APEX_BUDGETS_DAILY_TOKENS")]
    pub budgets_daily_tokens: u64,

    /// Per-episode token budget (scope `episode:<id>`). Zero disables
    /// the scope.
    #[arg(long, default_value_t = 0, env = "APEX_BUDGETS_EPISODE_TOKENS")]
    pub budgets_episode_tokens: u64,

    /// Per-role token budget (scope `agent:<role>`), given as repeated
    /// `role=tokens` pairs, e.g. `--budgets-agent-tokens planner=2000
    /// --budgets-agent-tokens critic=500`. A role absent from this list
    /// has no agent-scoped budget.
    #[arg(
        long = "budgets-agent-tokens",
        value_parser = parse_role_tokens,
        value_delimiter = ',',
        env = "APEX_BUDGETS_AGENT_TOKENS"
    )]
    pub budgets_agent_tokens: Vec<(String, u64)>,

    /// Max peers addressable by a single Flat-topology fan-out message.
    #[arg(long, default_value_t = 2, env = "APEX_FLAT_FANOUT_LIMIT")]
    pub flat_fanout_limit: usize,

    /// Decision window (in ticks) used for the Controller's rolling
    /// role-share features.
    #[arg(long, default_value_t = 5, env = "APEX_ROLE_WINDOW")]
    pub role_window: usize,

    /// Bandit exploration rate at decision 0.
    #[arg(long, default_value_t = 0.20, env = "APEX_EPSILON_START")]
    pub epsilon_start: f64,

    /// Bandit exploration rate once the schedule flattens.
    #[arg(long, default_value_t = 0.05, env = "APEX_EPSILON_END")]
    pub epsilon_end: f64,

    /// Decision count at which the epsilon schedule flattens.
    #[arg(long, default_value_t = 5_000, env = "APEX_EPSILON_SCHEDULE_N")]
    pub epsilon_schedule_n: u64,

    /// Ridge regression regularization (lambda in `A = lambda*I + ...`).
    #[arg(long, default_value_t = 1.0, env = "APEX_BANDIT_LAMBDA")]
    pub bandit_lambda: f64,

    /// Seed for the bandit's injected `StdRng`. Fixed by default so a
    /// run is reproducible; override for an actually-random run.
    #[arg(long, default_value_t = 0, env = "APEX_BANDIT_SEED")]
    pub bandit_seed: u64,

    /// Emit JSON-formatted logs instead of the human-readable default.
    #[arg(long, env = "APEX_LOG_JSON")]
    pub log_json: bool,
}

/// Parse one `role=tokens` pair from `--budgets-agent-tokens`.
fn parse_role_tokens(s: &str) -> Result<(String, u64), String> {
    let (role, tokens) = s.split_once('=').ok_or_else(|| format!("expected role=tokens, got {s:?}"))?;
    let tokens = tokens.parse::<u64>().map_err(|e| format!("invalid token count in {s:?}: {e}"))?;
    Ok((role.to_owned(), tokens))
}

impl ApexConfig {
    /// `budgets_agent_tokens` as a lookup map, the shape `BudgetConfig`
    /// wants.
    pub fn agent_tokens(&self) -> HashMap<String, u64> {
        self.budgets_agent_tokens.iter().cloned().collect()
    }

    pub fn quiesce_deadline(&self) -> Duration {
        Duration::from_millis(self.quiesce_deadline_ms)
    }

    pub fn prepare_deadline(&self) -> Duration {
        Duration::from_millis(self.prepare_deadline_ms)
    }

    pub fn health_probe_deadline(&self) -> Duration {
        Duration::from_millis(self.health_probe_deadline_ms)
    }

    pub fn message_ttl(&self) -> Duration {
        Duration::from_secs(self.message_ttl_s)
    }

    pub fn reservation_ttl(&self) -> Duration {
        Duration::from_secs(self.reservation_ttl_s)
    }

    pub fn budget_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.budget_sweep_interval_ms)
    }

    pub fn initial_topology(&self) -> anyhow::Result<crate::topology::Topology> {
        match self.initial_topology.to_lowercase().as_str() {
            "star" => Ok(crate::topology::Topology::Star),
            "chain" => Ok(crate::topology::Topology::Chain),
            "flat" => Ok(crate::topology::Topology::Flat),
            other => anyhow::bail!("unknown initial topology: {other}"),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
