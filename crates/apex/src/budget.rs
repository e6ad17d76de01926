// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Budget Guard: multi-scope (daily, per-episode, per-agent) token/time
//! budgets with an estimate -> reserve -> settle lifecycle. Grounded on the
//! per-account `session_counts: RwLock<HashMap<String, AtomicU32>>`
//! scoped-counter pattern (`crates/mux/src/credential/broker.rs`),
//! generalized from a single counter to a `{used, reserved, budget}`
//! triple per scope.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::error::BudgetDenyReason;

pub fn daily_scope() -> String {
    "daily".to_owned()
}

pub fn episode_scope(episode_id: &str) -> String {
    format!("episode:{episode_id}")
}

pub fn agent_scope(role: &str) -> String {
    format!("agent:{role}")
}

/// Per-scope budget + live counters, in tokens and (optionally) milliseconds.
#[derive(Debug, Clone, Copy, Default)]
struct ScopeState {
    budget_tokens: u64,
    used_tokens: u64,
    reserved_tokens: u64,
    budget_ms: Option<u64>,
    used_ms: u64,
    reserved_ms: u64,
}

/// A held reservation, open until `settle` or TTL expiry.
struct Reservation {
    scopes: Vec<String>,
    est_tokens: u64,
    est_ms: u64,
    created_at: Instant,
    ttl: Duration,
}

/// Static budget configuration: the daily ceiling, the per-episode ceiling
/// applied to every episode scope on first use, and per-role ceilings
/// (`budgets_agent_tokens[role]` in the config table).
#[derive(Debug, Clone, Default)]
pub struct BudgetConfig {
    pub daily_tokens: u64,
    pub episode_tokens: u64,
    pub agent_tokens: HashMap<String, u64>,
    pub safety_factor: f64,
    pub reservation_ttl: Duration,
}

pub struct BudgetGuard {
    config: BudgetConfig,
    scopes: RwLock<HashMap<String, ScopeState>>,
    reservations: RwLock<HashMap<uuid::Uuid, Reservation>>,
}

impl BudgetGuard {
    pub fn new(config: BudgetConfig) -> Self {
        Self { config, scopes: RwLock::new(HashMap::new()), reservations: RwLock::new(HashMap::new()) }
    }

    fn template_budget(&self, scope: &str) -> u64 {
        if scope == "daily" {
            self.config.daily_tokens
        } else if let Some(episode) = scope.strip_prefix("episode:") {
            let _ = episode;
            self.config.episode_tokens
        } else if let Some(role) = scope.strip_prefix("agent:") {
            self.config.agent_tokens.get(role).copied().unwrap_or(0)
        } else {
            0
        }
    }

    /// Check all named scopes against `used + reserved + safety_factor *
    /// est <= budget`. Denies on the first scope to violate; on overall
    /// allow, creates one reservation referencing every scope. Denied
    /// checks never mutate counters.
    pub async fn check_and_reserve(
        &self,
        scope_tags: &[String],
        est_tokens: u64,
        est_ms: u64,
    ) -> Result<uuid::Uuid, Vec<(String, BudgetDenyReason)>> {
        let mut scopes = self.scopes.write().await;
        let mut reasons = Vec::new();

        for scope in scope_tags {
            let state = scopes.entry(scope.clone()).or_insert_with(|| ScopeState {
                budget_tokens: self.template_budget(scope),
                ..Default::default()
            });

            let projected_tokens = state.used_tokens as f64
                + state.reserved_tokens as f64
                + self.config.safety_factor * est_tokens as f64;
            if projected_tokens > state.budget_tokens as f64 {
                reasons.push((scope.clone(), BudgetDenyReason::TokHeadroom));
                continue;
            }

            if let Some(budget_ms) = state.budget_ms {
                let projected_ms =
                    state.used_ms as f64 + state.reserved_ms as f64 + self.config.safety_factor * est_ms as f64;
                if projected_ms > budget_ms as f64 {
                    reasons.push((scope.clone(), BudgetDenyReason::MsHeadroom));
                }
            }
        }

        if !reasons.is_empty() {
            return Err(reasons);
        }

        for scope in scope_tags {
            if let Some(state) = scopes.get_mut(scope) {
                state.reserved_tokens += est_tokens;
                state.reserved_ms += est_ms;
            }
        }
        drop(scopes);

        let id = uuid::Uuid::new_v4();
        self.reservations.write().await.insert(
            id,
            Reservation {
                scopes: scope_tags.to_vec(),
                est_tokens,
                est_ms,
                created_at: Instant::now(),
                ttl: self.config.reservation_ttl,
            },
        );
        Ok(id)
    }

    /// Replace a reservation's held estimate with actuals. Overshoot
    /// (actual > estimate) is allowed and accounted; the reserved slot is
    /// considered fully consumed regardless of direction.
    pub async fn settle(&self, reservation_id: uuid::Uuid, actual_tokens: u64, actual_ms: u64) {
        let reservation = self.reservations.write().await.remove(&reservation_id);
        let Some(reservation) = reservation else { return };

        let mut scopes = self.scopes.write().await;
        for scope in &reservation.scopes {
            if let Some(state) = scopes.get_mut(scope) {
                state.used_tokens += actual_tokens;
                state.used_ms += actual_ms;
                state.reserved_tokens = state.reserved_tokens.saturating_sub(reservation.est_tokens);
                state.reserved_ms = state.reserved_ms.saturating_sub(reservation.est_ms);
            }
        }
    }

    /// Sweep reservations past their TTL, debiting the estimate into
    /// `used` as though it had been spent (prevents a crashed caller from
    /// deadlocking the scope's headroom).
    pub async fn expire(&self, now: Instant) {
        let expired: Vec<uuid::Uuid> = {
            let reservations = self.reservations.read().await;
            reservations
                .iter()
                .filter(|(_, r)| now.saturating_duration_since(r.created_at) >= r.ttl)
                .map(|(id, _)| *id)
                .collect()
        };

        for id in expired {
            let reservation = self.reservations.write().await.remove(&id);
            let Some(reservation) = reservation else { continue };
            let mut scopes = self.scopes.write().await;
            for scope in &reservation.scopes {
                if let Some(state) = scopes.get_mut(scope) {
                    state.used_tokens += reservation.est_tokens;
                    state.used_ms += reservation.est_ms;
                    state.reserved_tokens = state.reserved_tokens.saturating_sub(reservation.est_tokens);
                    state.reserved_ms = state.reserved_ms.saturating_sub(reservation.est_ms);
                }
            }
        }
    }

    /// Headroom fraction for a scope, used as controller feature 8
    /// (`max(0, 1 - used/budget)`). Returns 0 if the scope has no budget.
    pub async fn headroom(&self, scope: &str) -> f64 {
        let scopes = self.scopes.read().await;
        match scopes.get(scope) {
            Some(state) if state.budget_tokens > 0 => {
                (1.0 - state.used_tokens as f64 / state.budget_tokens as f64).max(0.0)
            }
            _ => 0.0,
        }
    }

    #[cfg(test)]
    async fn used_and_reserved(&self, scope: &str) -> (u64, u64) {
        let scopes = self.scopes.read().await;
        scopes.get(scope).map(|s| (s.used_tokens, s.reserved_tokens)).unwrap_or_default()
    }
}

/// Spawn the periodic reservation-expiry sweeper, following the
/// `spawn_health_checker` shape (`crates/mux/src/upstream/health.rs`): a
/// cancellation-gated `tokio::time::interval` loop.
pub fn spawn_expiry_sweeper(
    guard: std::sync::Arc<BudgetGuard>,
    interval: Duration,
    shutdown: tokio_util::sync::CancellationToken,
) {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            guard.expire(Instant::now()).await;
        }
    });
}

#[cfg(test)]
#[path = "budget_tests.rs"]
mod tests;
