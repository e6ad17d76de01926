use serde_json::Map;

use super::*;

fn limits() -> RouterLimits {
    RouterLimits {
        hub: "hub".to_owned(),
        queue_capacity_per_receiver: 4,
        message_ttl: Duration::from_secs(60),
        max_attempts: 3,
        payload_max_bytes: 1024,
        flat_fanout_limit: 3,
    }
}

fn envelope(sender: &str, to: &str) -> Envelope {
    Envelope {
        episode_id: "ep-1".to_owned(),
        msg_id: uuid::Uuid::new_v4().to_string(),
        sender: sender.to_owned(),
        recipient: EnvelopeRecipient::One(to.to_owned()),
        payload: Payload::empty(),
        ttl: None,
    }
}

#[tokio::test]
async fn direct_route_admits_and_is_dequeued_fifo() {
    let router = Router::new(limits(), Topology::Chain);
    router.route(envelope("planner", "coder")).await.unwrap();
    router.route(envelope("planner", "coder")).await.unwrap();

    let (topo, epoch) = router.active().await;
    assert_eq!(topo, Topology::Chain);
    assert_eq!(epoch, 1);

    let first = router.dequeue("coder").await.unwrap();
    assert_eq!(first.topo_epoch, 1);
    assert!(router.dequeue("coder").await.is_some());
    assert!(router.dequeue("coder").await.is_none());
}

#[tokio::test]
async fn topology_violation_is_rejected_without_enqueueing() {
    let router = Router::new(limits(), Topology::Chain);
    let result = router.route(envelope("coder", "critic")).await;
    assert_eq!(result, Err(DropReason::TopologyViolation));
    assert!(router.dequeue("critic").await.is_none());
}

#[tokio::test]
async fn star_topology_rewrites_to_single_hub_message() {
    let router = Router::new(limits(), Topology::Star);
    let ids = router.route(envelope("coder", "runner")).await.unwrap();
    assert_eq!(ids.len(), 1);

    let message = router.dequeue("hub").await.unwrap();
    assert_eq!(message.payload.forward_to(), Some("runner"));
    assert!(router.dequeue("runner").await.is_none());
}

#[tokio::test]
async fn flat_fanout_produces_one_message_per_recipient_with_distinct_ids() {
    let router = Router::new(limits(), Topology::Flat);
    let envelope = Envelope {
        episode_id: "ep-1".to_owned(),
        msg_id: uuid::Uuid::new_v4().to_string(),
        sender: "critic".to_owned(),
        recipient: EnvelopeRecipient::Many(vec!["coder".to_owned(), "runner".to_owned()]),
        payload: Payload::empty(),
        ttl: None,
    };
    let ids = router.route(envelope).await.unwrap();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
    assert!(router.dequeue("coder").await.is_some());
    assert!(router.dequeue("runner").await.is_some());
}

#[tokio::test]
async fn queue_full_drops_admission_past_capacity() {
    let router = Router::new(limits(), Topology::Chain);
    for _ in 0..4 {
        router.route(envelope("planner", "coder")).await.unwrap();
    }
    let result = router.route(envelope("planner", "coder")).await;
    assert_eq!(result, Err(DropReason::QueueFull));
    assert_eq!(router.counters().dropped_queue_full, 1);
}

#[tokio::test]
async fn duplicate_message_is_dropped_per_recipient_scope() {
    let router = Router::new(limits(), Topology::Chain);
    let mut payload_fields = Map::new();
    payload_fields.insert("x".to_owned(), serde_json::Value::from(1));
    let payload = Payload::try_new(payload_fields, 1024).unwrap();

    let envelope = Envelope {
        episode_id: "ep-1".to_owned(),
        msg_id: "producer-msg-1".to_owned(),
        sender: "planner".to_owned(),
        recipient: EnvelopeRecipient::One("coder".to_owned()),
        payload,
        ttl: None,
    };
    // A genuine producer resubmission carries the same msg_id: the
    // second route call must be rejected as a duplicate, and the first
    // delivery must still be the only one sitting in the queue.
    let ids = router.route(envelope.clone()).await.unwrap();
    let result = router.route(envelope).await;
    assert_eq!(result, Err(DropReason::DedupDuplicate));
    assert_eq!(router.counters().dropped_dedup_duplicate, 1);

    let message = router.dequeue("coder").await.unwrap();
    assert_eq!(message.msg_id, ids[0]);
    assert!(router.dequeue("coder").await.is_none());
}

#[tokio::test]
async fn expired_head_message_is_dropped_not_returned() {
    let mut lim = limits();
    lim.message_ttl = Duration::from_millis(1);
    let router = Router::new(lim, Topology::Chain);
    router.route(envelope("planner", "coder")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert!(router.dequeue("coder").await.is_none());
    assert_eq!(router.counters().dropped_expired, 1);
}

#[tokio::test]
async fn retry_past_max_attempts_is_dropped() {
    let router = Router::new(limits(), Topology::Chain);
    router.route(envelope("planner", "coder")).await.unwrap();
    let mut message = router.dequeue("coder").await.unwrap();
    message.attempt = limits().max_attempts;

    let result = router.retry(message).await;
    assert_eq!(result, Err(DropReason::MaxAttempts));
}

#[tokio::test]
async fn retry_reenqueues_with_incremented_attempt_and_same_dedup_key() {
    let router = Router::new(limits(), Topology::Chain);
    router.route(envelope("planner", "coder")).await.unwrap();
    let message = router.dequeue("coder").await.unwrap();
    let key = message.dedup_key();

    router.retry(message).await.unwrap();
    let retried = router.dequeue("coder").await.unwrap();
    assert_eq!(retried.attempt, 1);
    assert!(retried.redelivered);
    assert_eq!(retried.dedup_key(), key);
}

#[tokio::test]
async fn buffer_to_next_stamps_the_next_epoch_while_prepared() {
    let router = Router::new(limits(), Topology::Chain);
    router.shared().begin_prepare().await;

    router.route(envelope("planner", "coder")).await.unwrap();
    // While buffering, active queue stays empty and the message is
    // stamped for epoch 2 even though nothing has committed yet.
    assert!(router.dequeue("coder").await.is_none());

    let epoch = router.shared().commit_switch(Topology::Chain).await;
    assert_eq!(epoch, 2);
    let message = router.dequeue("coder").await.unwrap();
    assert_eq!(message.topo_epoch, 2);
}

#[tokio::test]
async fn abort_splices_next_queue_onto_active_tail_preserving_fifo() {
    let router = Router::new(limits(), Topology::Chain);
    router.route(envelope("planner", "coder")).await.unwrap();

    router.shared().begin_prepare().await;
    router.route(envelope("planner", "coder")).await.unwrap();
    router.shared().abort_switch().await;

    let first = router.dequeue("coder").await.unwrap();
    let second = router.dequeue("coder").await.unwrap();
    assert!(first.created_ts <= second.created_ts);
    assert!(router.dequeue("coder").await.is_none());
}

#[tokio::test]
async fn dequeue_wait_resolves_once_a_message_is_routed() {
    let router = Router::new(limits(), Topology::Chain);
    let waiter_router = router.clone();
    let handle = tokio::spawn(async move { waiter_router.dequeue_wait("coder").await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    router.route(envelope("planner", "coder")).await.unwrap();

    let message = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    assert_eq!(message.recipient, "coder");
}
