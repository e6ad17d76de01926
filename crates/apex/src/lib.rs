// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Apex: a single-host coordination runtime for a small team of
//! role-specialized agents, with a runtime-switchable inter-agent
//! topology (Star, Chain, Flat) governed by an epoch-gated
//! PREPARE -> QUIESCE -> COMMIT/ABORT protocol.

pub mod budget;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod dedup;
pub mod error;
pub mod events;
pub mod intent_log;
pub mod message;
pub mod observability;
pub mod router;
pub mod switch_engine;
pub mod topology;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::budget::{BudgetConfig, BudgetGuard};
use crate::config::ApexConfig;
use crate::controller::bandit::BanditConfig;
use crate::controller::{Controller, ControllerConfig};
use crate::coordinator::{AlwaysHealthy, Coordinator, CoordinatorConfig};
use crate::events::EventBus;
use crate::intent_log::InMemoryIntentLog;
use crate::observability::{build_router, ObservabilityState};
use crate::router::{Router, RouterLimits};
use crate::switch_engine::{NoopWarmup, SwitchEngine, SwitchEngineConfig};

/// Everything spawned by `run`, held so the caller (or a test) can drive
/// the runtime directly instead of only through the HTTP surface.
pub struct Runtime {
    pub router: Router,
    pub coordinator: Arc<Coordinator>,
    pub budget: Arc<BudgetGuard>,
    pub controller: Arc<Controller>,
    pub events: EventBus,
    pub shutdown: CancellationToken,
}

/// Assemble every component from `config`, for a fixed `episode_id`.
/// Spawns the budget expiry sweeper; does not spawn the Controller's
/// decision loop or the observability server — callers decide the
/// cadence and whether to serve HTTP (`run` below does both).
pub fn build(config: &ApexConfig, episode_id: impl Into<String>) -> anyhow::Result<Runtime> {
    let initial_topology = config.initial_topology()?;
    let shutdown = CancellationToken::new();

    let router = Router::new(
        RouterLimits {
            hub: config.hub.clone(),
            queue_capacity_per_receiver: config.queue_capacity_per_receiver,
            message_ttl: config.message_ttl(),
            max_attempts: config.max_attempts,
            payload_max_bytes: config.payload_max_bytes,
            flat_fanout_limit: config.flat_fanout_limit,
        },
        initial_topology,
    );

    let events = EventBus::new();
    let engine = SwitchEngine::new(
        router.shared(),
        Arc::new(NoopWarmup),
        Arc::new(InMemoryIntentLog::default()),
        events.clone(),
        SwitchEngineConfig {
            prepare_deadline: config.prepare_deadline(),
            quiesce_deadline: config.quiesce_deadline(),
            quiesce_poll_interval: std::time::Duration::from_millis(2),
        },
    );
    let coordinator = Arc::new(Coordinator::new(
        engine,
        Box::new(AlwaysHealthy),
        CoordinatorConfig {
            dwell_min_steps: config.dwell_min_steps,
            cooldown_steps: config.cooldown_steps,
            health_probe_deadline: config.health_probe_deadline(),
        },
    ));

    let budget = Arc::new(BudgetGuard::new(BudgetConfig {
        daily_tokens: config.budgets_daily_tokens,
        episode_tokens: config.budgets_episode_tokens,
        agent_tokens: config.agent_tokens(),
        safety_factor: config.safety_factor,
        reservation_ttl: config.reservation_ttl(),
    }));
    budget::spawn_expiry_sweeper(budget.clone(), config.budget_sweep_interval(), shutdown.clone());

    let controller = Arc::new(Controller::new(
        router.clone(),
        coordinator.clone(),
        budget.clone(),
        ControllerConfig {
            episode_id: episode_id.into(),
            role_window: config.role_window,
            bandit: BanditConfig {
                lambda: config.bandit_lambda,
                epsilon_start: config.epsilon_start,
                epsilon_end: config.epsilon_end,
                epsilon_schedule_n: config.epsilon_schedule_n,
            },
            rng_seed: config.bandit_seed,
            log_capacity: 0,
        },
    ));

    Ok(Runtime { router, coordinator, budget, controller, events, shutdown })
}

/// Run the observability surface until shutdown. The Controller's
/// decision loop is driven by its caller (an agent orchestration loop,
/// out of this core's scope) via `Runtime.controller`.
pub async fn run(config: ApexConfig) -> anyhow::Result<()> {
    let runtime = build(&config, "default")?;
    let addr = format!("{}:{}", config.host, config.port);

    let state = Arc::new(ObservabilityState { router: runtime.router.clone() });
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "apex observability surface listening");

    let shutdown = runtime.shutdown.clone();
    axum::serve(listener, app).with_graceful_shutdown(shutdown.cancelled_owned()).await?;
    Ok(())
}
