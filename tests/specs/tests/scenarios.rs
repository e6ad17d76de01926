// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios driving the Router standalone (topology-only
//! cases) or the full assembled runtime (`apex::build`) through its
//! public surface, the way an agent orchestration loop outside this
//! crate would.

use std::sync::Arc;
use std::time::Duration;

use apex::config::ApexConfig;
use apex::coordinator::Coordinator;
use apex::error::{AbortReason, BudgetDenyReason, DeferReason, DropReason, RejectReason, SwitchOutcome};
use apex::message::Payload;
use apex::router::{Envelope, EnvelopeRecipient, Router, RouterLimits};
use apex::topology::Topology;
use apex::budget::{episode_scope, BudgetConfig, BudgetGuard};

fn router_with(topology: Topology, hub: &str, fanout_limit: usize) -> Router {
    Router::new(
        RouterLimits {
            hub: hub.to_owned(),
            queue_capacity_per_receiver: 16,
            message_ttl: Duration::from_secs(60),
            max_attempts: 3,
            payload_max_bytes: 4096,
            flat_fanout_limit: fanout_limit,
        },
        topology,
    )
}

fn envelope_one(sender: &str, recipient: &str) -> Envelope {
    Envelope {
        episode_id: "ep-1".to_owned(),
        msg_id: uuid::Uuid::new_v4().to_string(),
        sender: sender.to_owned(),
        recipient: EnvelopeRecipient::One(recipient.to_owned()),
        payload: Payload::empty(),
        ttl: None,
    }
}

/// A config with every deadline shrunk for test speed. Individual tests
/// override the fields their scenario actually exercises.
fn base_config() -> ApexConfig {
    ApexConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        hub: "planner".to_owned(),
        initial_topology: "chain".to_owned(),
        quiesce_deadline_ms: 100,
        prepare_deadline_ms: 100,
        dwell_min_steps: 0,
        cooldown_steps: 0,
        health_probe_deadline_ms: 20,
        queue_capacity_per_receiver: 16,
        message_ttl_s: 60,
        max_attempts: 3,
        payload_max_bytes: 4096,
        safety_factor: 1.2,
        reservation_ttl_s: 10,
        budget_sweep_interval_ms: 1_000,
        budgets_daily_tokens: 0,
        budgets_episode_tokens: 0,
        budgets_agent_tokens: Vec::new(),
        flat_fanout_limit: 2,
        role_window: 5,
        epsilon_start: 0.20,
        epsilon_end: 0.05,
        epsilon_schedule_n: 5_000,
        bandit_lambda: 1.0,
        bandit_seed: 0,
        log_json: false,
    }
}

#[tokio::test]
async fn chain_topology_enforces_strict_next_hop() {
    let router = router_with(Topology::Chain, "planner", 2);

    let ids = router.route(envelope_one("user", "planner")).await.expect("external sender enters at planner");
    assert_eq!(ids.len(), 1);

    let ids = router.route(envelope_one("planner", "coder")).await.expect("planner -> coder is the next hop");
    assert_eq!(ids.len(), 1);

    let err = router.route(envelope_one("planner", "runner")).await.expect_err("skipping coder must be rejected");
    assert_eq!(err, DropReason::TopologyViolation);
}

#[tokio::test]
async fn star_topology_rewrites_non_hub_traffic_through_the_hub() {
    let router = router_with(Topology::Star, "planner", 2);

    router.route(envelope_one("coder", "runner")).await.expect("non-hub traffic is rewritten, not rejected");

    let at_hub = router.dequeue("planner").await.expect("rewritten message lands at the hub");
    assert_eq!(at_hub.payload.forward_to(), Some("runner"));
    assert!(router.dequeue("runner").await.is_none(), "star never delivers direct to a non-hub recipient");

    router.route(envelope_one("planner", "coder")).await.expect("hub-initiated traffic is direct");
    let direct = router.dequeue("coder").await.expect("hub-initiated message is not rewritten");
    assert!(direct.payload.forward_to().is_none());
}

#[tokio::test]
async fn flat_topology_bounds_fanout_to_the_configured_limit() {
    let router = router_with(Topology::Flat, "planner", 2);

    let ids = router
        .route(Envelope {
            recipient: EnvelopeRecipient::Many(vec!["coder".to_owned(), "runner".to_owned()]),
            ..envelope_one("planner", "unused")
        })
        .await
        .expect("fanout at the limit is admitted");
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1], "each fanout copy gets its own msg_id");

    let err = router
        .route(Envelope {
            recipient: EnvelopeRecipient::Many(vec!["coder".to_owned(), "runner".to_owned(), "critic".to_owned()]),
            ..envelope_one("planner", "unused")
        })
        .await
        .expect_err("fanout past the limit must be rejected");
    assert_eq!(err, DropReason::TopologyViolation);
}

#[tokio::test]
async fn switching_topologies_stamps_in_flight_messages_with_the_correct_epoch() {
    let runtime = apex::build(&base_config(), "ep-1").expect("runtime assembles");
    let router = runtime.router.clone();
    let coordinator = runtime.coordinator.clone();

    // Keeps "coder"'s active queue non-empty until drained below, so
    // QUIESCE cannot complete before we've buffered a second message.
    router.route(envelope_one("planner", "coder")).await.unwrap();

    let switching = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_switch(Topology::Chain, Topology::Star).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    // Validated under the still-active Chain topology (the switch hasn't
    // committed yet): coder -> runner is the next hop, admitted direct.
    let buffered_ids = router.route(envelope_one("coder", "runner")).await.unwrap();
    assert_eq!(buffered_ids.len(), 1);

    let pre_existing = router.dequeue("coder").await.expect("pre-existing message still queued");
    assert_eq!(pre_existing.topo_epoch, 1);

    let outcome = switching.await.unwrap();
    assert_eq!(outcome, SwitchOutcome::Committed { epoch: 2 });

    let buffered = router.dequeue("runner").await.expect("buffered message now deliverable post-commit");
    assert_eq!(buffered.topo_epoch, 2);
}

#[tokio::test]
async fn quiesce_timeout_aborts_and_preserves_fifo_order_on_re_merge() {
    let config = ApexConfig { quiesce_deadline_ms: 20, prepare_deadline_ms: 100, ..base_config() };
    let runtime = apex::build(&config, "ep-1").expect("runtime assembles");
    let router = runtime.router.clone();
    let coordinator = runtime.coordinator.clone();

    // This message is never drained, so QUIESCE can never observe zero
    // active depth and the switch must time out.
    router.route(envelope_one("planner", "coder")).await.unwrap();

    let switching = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_switch(Topology::Chain, Topology::Star).await })
    };

    tokio::time::sleep(Duration::from_millis(5)).await;
    router.route(envelope_one("planner", "coder")).await.unwrap();

    let outcome = switching.await.unwrap();
    assert_eq!(outcome, SwitchOutcome::Aborted { reason: AbortReason::QuiesceTimeout });

    let first = router.dequeue("coder").await.expect("first message survives the abort");
    let second = router.dequeue("coder").await.expect("second message was re-merged onto the tail");
    assert_ne!(first.msg_id, second.msg_id);
    assert_eq!(first.topo_epoch, 1, "the message already active before PREPARE keeps its epoch");
    assert_eq!(second.topo_epoch, 2, "the message buffered during PREPARE keeps its provisional stamp on abort");

    let (topology, epoch) = router.active().await;
    assert_eq!(topology, Topology::Chain, "abort leaves the topology unchanged");
    assert_eq!(epoch, 1, "abort never commits, so the epoch counter itself stays put");
}

#[tokio::test]
async fn budget_denial_blocks_a_reservation_without_mutating_counters() {
    let guard = BudgetGuard::new(BudgetConfig {
        daily_tokens: 1_000,
        episode_tokens: 1_000,
        agent_tokens: Default::default(),
        safety_factor: 1.2,
        reservation_ttl: Duration::from_secs(10),
    });
    let scope = episode_scope("ep-1");

    let before = guard.headroom(&scope).await;
    assert_eq!(before, 0.0, "an untouched scope reports zero headroom until first use");

    let result = guard.check_and_reserve(&[scope.clone()], 900, 0).await;
    let Err(reasons) = result else { panic!("900 * 1.2 = 1080 exceeds the 1000-token budget") };
    assert_eq!(reasons, vec![(scope.clone(), BudgetDenyReason::TokHeadroom)]);

    // A within-budget estimate is accepted and reserved.
    let id = guard.check_and_reserve(&[scope.clone()], 400, 0).await.expect("400 * 1.2 = 480 fits");
    guard.settle(id, 400, 0).await;
    let after = guard.headroom(&scope).await;
    assert!((after - 0.6).abs() < 1e-9, "headroom should be 1 - 400/1000 = 0.6, got {after}");
}

#[tokio::test]
async fn coordinator_enforces_dwell_before_first_switch_then_cooldown_after_commit() {
    let config = ApexConfig { dwell_min_steps: 1, cooldown_steps: 3, ..base_config() };
    let runtime = apex::build(&config, "ep-1").expect("runtime assembles");
    let coordinator = runtime.coordinator;

    let rejected = coordinator.request_switch(Topology::Chain, Topology::Star).await;
    assert_eq!(rejected, SwitchOutcome::Rejected { reason: RejectReason::Dwell });

    coordinator.begin_tick();
    let committed = coordinator.request_switch(Topology::Chain, Topology::Star).await;
    assert_eq!(committed, SwitchOutcome::Committed { epoch: 2 });

    // Dwell is satisfied by the very next tick, but cooldown still gates.
    coordinator.begin_tick();
    let rejected = coordinator.request_switch(Topology::Star, Topology::Flat).await;
    assert_eq!(rejected, SwitchOutcome::Rejected { reason: RejectReason::Cooldown });

    coordinator.begin_tick();
    coordinator.begin_tick();
    let committed = coordinator.request_switch(Topology::Star, Topology::Flat).await;
    assert_eq!(committed, SwitchOutcome::Committed { epoch: 3 });
}

#[tokio::test]
async fn concurrent_switch_requests_defer_rather_than_queue() {
    let config = ApexConfig { cooldown_steps: 1, quiesce_deadline_ms: 200, prepare_deadline_ms: 100, ..base_config() };
    let runtime = apex::build(&config, "ep-1").expect("runtime assembles");
    let router = runtime.router.clone();
    let coordinator: Arc<Coordinator> = runtime.coordinator;

    // A pending message keeps the first switch stuck in QUIESCE long
    // enough for a second, concurrent request to observe the lock held.
    router.route(envelope_one("planner", "coder")).await.unwrap();

    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_switch(Topology::Chain, Topology::Star).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let deferred = coordinator.request_switch(Topology::Chain, Topology::Flat).await;
    assert_eq!(deferred, SwitchOutcome::Deferred { reason: DeferReason::InFlight });
    assert_eq!(coordinator.pending_target(), Some(Topology::Flat));

    router.dequeue("coder").await;
    let outcome = first.await.unwrap();
    assert_eq!(outcome, SwitchOutcome::Committed { epoch: 2 });
}
