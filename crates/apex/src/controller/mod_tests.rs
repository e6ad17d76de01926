use std::time::Duration;

use super::*;
use crate::budget::BudgetConfig;
use crate::coordinator::{AlwaysHealthy, CoordinatorConfig};
use crate::events::EventBus;
use crate::intent_log::InMemoryIntentLog;
use crate::router::RouterLimits;
use crate::switch_engine::{NoopWarmup, SwitchEngine, SwitchEngineConfig};

fn limits() -> RouterLimits {
    RouterLimits {
        hub: "hub".to_owned(),
        queue_capacity_per_receiver: 8,
        message_ttl: Duration::from_secs(60),
        max_attempts: 3,
        payload_max_bytes: 1024,
        flat_fanout_limit: 3,
    }
}

fn controller_with(config: ControllerConfig) -> Controller {
    let router = Router::new(limits(), Topology::Chain);
    let engine = SwitchEngine::new(
        router.shared(),
        Arc::new(NoopWarmup),
        Arc::new(InMemoryIntentLog::default()),
        EventBus::new(),
        SwitchEngineConfig::default(),
    );
    let coordinator = Arc::new(Coordinator::new(
        engine,
        Box::new(AlwaysHealthy),
        CoordinatorConfig { dwell_min_steps: 0, cooldown_steps: 2, health_probe_deadline: Duration::from_millis(20) },
    ));
    let budget = Arc::new(BudgetGuard::new(BudgetConfig::default()));
    Controller::new(router, coordinator, budget, config)
}

fn config() -> ControllerConfig {
    ControllerConfig {
        episode_id: "ep-1".to_owned(),
        role_window: 5,
        bandit: BanditConfig::default(),
        rng_seed: 1,
        log_capacity: 100,
    }
}

#[tokio::test]
async fn every_tick_always_produces_a_full_feature_vector_and_record() {
    let controller = controller_with(config());
    let record = controller.tick(TickOutcomeInputs::default()).await;
    assert_eq!(record.features.len(), FEATURE_DIM);
    assert_eq!(record.step, 0);

    let second = controller.tick(TickOutcomeInputs::default()).await;
    assert_eq!(second.step, 1);
}

#[tokio::test]
async fn decision_log_is_capped_at_configured_capacity() {
    let mut cfg = config();
    cfg.log_capacity = 3;
    let controller = controller_with(cfg);
    for _ in 0..5 {
        controller.tick(TickOutcomeInputs::default()).await;
    }
    let log = controller.decision_log().await;
    assert_eq!(log.len(), 3);
    assert_eq!(log.last().unwrap().step, 4);
}

#[tokio::test]
async fn stay_arm_never_calls_request_switch() {
    // Force epsilon to 0 and only ever reward `Stay`, so the greedy
    // policy converges to never attempting a switch.
    let mut cfg = config();
    cfg.bandit = BanditConfig { lambda: 1.0, epsilon_start: 0.0, epsilon_end: 0.0, epsilon_schedule_n: 0 };
    let controller = controller_with(cfg);

    for _ in 0..10 {
        let record = controller.tick(TickOutcomeInputs { episode_terminal_success: true, ..Default::default() }).await;
        if record.action != "stay" {
            // Exploration disabled and reward only reinforces stay; once
            // warmed up it should settle on stay. Allow early ticks to
            // vary while all arms still carry zero weight.
            continue;
        }
        assert!(!record.switch.attempted);
    }
}
