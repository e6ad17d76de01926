// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Router: admission (Topology Guard + dedup + payload check), bounded
//! per-recipient FIFO queues, and epoch stamping. Grounded on
//! `crates/mux/src/state.rs`/`transport/http.rs`'s request-admission
//! path, generalized from a single upstream queue to a
//! `Q_active`/`Q_next` pair per recipient.
//!
//! The composite state below (queues, dedup, topology, epoch,
//! `buffer_to_next`) is guarded by a single `tokio::sync::Mutex` rather
//! than per-recipient locking: at the bounded scale this runtime
//! targets (<=7 agents, single host) one mutex is never a contended hot
//! path, and it makes the epoch-stamp-then-enqueue atomic region
//! trivial to satisfy. Recorded in DESIGN.md.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};

use crate::dedup::DedupStore;
use crate::error::DropReason;
use crate::message::{Message, Payload};
use crate::topology::{validate, RecipientSpec, RoutingIntent, Topology};

/// What a producer submits to the Router. Distinct from `Message`: a Flat
/// fanout request carries a recipient list, but each queued `Message` is
/// always addressed to exactly one recipient with its own `msg_id`.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub episode_id: String,
    /// Producer-assigned id, carried through unchanged on the
    /// single-recipient paths so a resubmission of the same message
    /// dedups against the earlier delivery. A Flat fanout mints a fresh
    /// id per recipient copy instead of reusing this one.
    pub msg_id: String,
    pub sender: String,
    pub recipient: EnvelopeRecipient,
    pub payload: Payload,
    pub ttl: Option<Duration>,
}

#[derive(Debug, Clone)]
pub enum EnvelopeRecipient {
    One(String),
    Many(Vec<String>),
}

/// Per-recipient queue pair: `active` is drained by `dequeue`; `next`
/// only accumulates while a switch is in PREPARE/QUIESCE and is spliced
/// into `active` on COMMIT (or appended back on ABORT).
#[derive(Default)]
struct QueuePair {
    active: VecDeque<Message>,
    next: VecDeque<Message>,
}

struct RouterState {
    queues: HashMap<String, QueuePair>,
    dedup: DedupStore,
    topology: Topology,
    epoch: u64,
    buffer_to_next: bool,
}

/// Static router configuration.
#[derive(Debug, Clone)]
pub struct RouterLimits {
    pub hub: String,
    pub queue_capacity_per_receiver: usize,
    pub message_ttl: Duration,
    pub max_attempts: u32,
    pub payload_max_bytes: usize,
    pub flat_fanout_limit: usize,
}

#[derive(Default)]
struct Counters {
    admitted: AtomicU64,
    dropped_invalid_payload: AtomicU64,
    dropped_topology_violation: AtomicU64,
    dropped_queue_full: AtomicU64,
    dropped_dedup_duplicate: AtomicU64,
    dropped_expired: AtomicU64,
    dropped_max_attempts: AtomicU64,
}

impl Counters {
    fn record_drop(&self, reason: DropReason) {
        let cell = match reason {
            DropReason::InvalidPayload => &self.dropped_invalid_payload,
            DropReason::TopologyViolation => &self.dropped_topology_violation,
            DropReason::QueueFull => &self.dropped_queue_full,
            DropReason::DedupDuplicate => &self.dropped_dedup_duplicate,
            DropReason::Expired => &self.dropped_expired,
            DropReason::MaxAttempts => &self.dropped_max_attempts,
        };
        cell.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time counters snapshot for `/metrics`.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CountersSnapshot {
    pub admitted: u64,
    pub dropped_invalid_payload: u64,
    pub dropped_topology_violation: u64,
    pub dropped_queue_full: u64,
    pub dropped_dedup_duplicate: u64,
    pub dropped_expired: u64,
    pub dropped_max_attempts: u64,
}

/// Shared inner state, held by both `Router` and `SwitchEngine` so a
/// switch's QUIESCE/COMMIT/ABORT phases operate on the same queues and
/// epoch that `route`/`dequeue` see.
pub(crate) struct RouterShared {
    state: Mutex<RouterState>,
    notify: Notify,
    limits: RouterLimits,
    counters: Counters,
}

impl RouterShared {
    pub(crate) fn config(&self) -> &RouterLimits {
        &self.limits
    }

    /// PREPARE: start buffering new admissions into `Q_next`. `Q_next`
    /// is expected empty (a prior switch always drains or re-merges it);
    /// cleared defensively regardless.
    pub(crate) async fn begin_prepare(&self) {
        let mut state = self.state.lock().await;
        for pair in state.queues.values_mut() {
            pair.next.clear();
        }
        state.buffer_to_next = true;
    }

    /// Total depth across all recipients' active queues, the QUIESCE
    /// drain condition.
    pub(crate) async fn total_active_depth(&self) -> usize {
        let state = self.state.lock().await;
        state.queues.values().map(|p| p.active.len()).sum()
    }

    /// The epoch currently committed (not yet bumped by an in-flight
    /// switch's eventual COMMIT).
    pub(crate) async fn current_epoch(&self) -> u64 {
        self.state.lock().await.epoch
    }

    /// COMMIT: swap `Q_next` into `Q_active` for every recipient, bump
    /// the epoch, adopt the new topology, and stop buffering.
    pub(crate) async fn commit_switch(&self, target: Topology) -> u64 {
        let mut state = self.state.lock().await;
        for pair in state.queues.values_mut() {
            std::mem::swap(&mut pair.active, &mut pair.next);
            pair.next.clear();
        }
        state.epoch += 1;
        state.topology = target;
        state.buffer_to_next = false;
        let epoch = state.epoch;
        drop(state);
        self.notify.notify_waiters();
        epoch
    }

    /// ABORT: splice whatever accumulated in `Q_next` onto the tail of
    /// `Q_active`, preserving FIFO order, and stop buffering. Topology
    /// and epoch are untouched.
    pub(crate) async fn abort_switch(&self) {
        let mut state = self.state.lock().await;
        for pair in state.queues.values_mut() {
            while let Some(message) = pair.next.pop_front() {
                pair.active.push_back(message);
            }
        }
        state.buffer_to_next = false;
        drop(state);
        self.notify.notify_waiters();
    }
}

#[derive(Clone)]
pub struct Router {
    pub(crate) shared: Arc<RouterShared>,
}

impl Router {
    pub fn new(limits: RouterLimits, initial_topology: Topology) -> Self {
        let state = RouterState {
            queues: HashMap::new(),
            dedup: DedupStore::default(),
            topology: initial_topology,
            epoch: 1,
            buffer_to_next: false,
        };
        Self {
            shared: Arc::new(RouterShared {
                state: Mutex::new(state),
                notify: Notify::new(),
                limits,
                counters: Counters::default(),
            }),
        }
    }

    pub(crate) fn shared(&self) -> Arc<RouterShared> {
        self.shared.clone()
    }

    /// Admit an envelope: run the Topology Guard, then dedup, then
    /// enqueue one `Message` per resolved recipient. Returns the admitted
    /// `msg_id`s in recipient order, or the first rejection reason.
    pub async fn route(&self, envelope: Envelope) -> Result<Vec<String>, DropReason> {
        let mut state = self.shared.state.lock().await;

        let recipient_spec = match &envelope.recipient {
            EnvelopeRecipient::One(to) => RecipientSpec::Single(to.as_str()),
            EnvelopeRecipient::Many(list) => RecipientSpec::List(list.as_slice()),
        };

        let intent = validate(
            state.topology,
            &self.shared.limits.hub,
            &envelope.sender,
            recipient_spec,
            self.shared.limits.flat_fanout_limit,
        )
        .map_err(|reason| {
            self.shared.counters.record_drop(reason);
            reason
        })?;

        let ttl = envelope.ttl.unwrap_or(self.shared.limits.message_ttl);
        let targets: Vec<Message> = match intent {
            RoutingIntent::Direct { to } => {
                vec![Message::new(
                    envelope.episode_id.clone(),
                    envelope.msg_id.clone(),
                    envelope.sender.clone(),
                    to,
                    envelope.payload.clone(),
                    ttl,
                )]
            }
            RoutingIntent::RouteViaHub { hub, forward_to } => {
                let mut payload = envelope.payload.clone();
                payload.insert("forward_to", serde_json::Value::String(forward_to));
                vec![Message::new(envelope.episode_id.clone(), envelope.msg_id.clone(), envelope.sender.clone(), hub, payload, ttl)]
            }
            RoutingIntent::Fanout { recipients } => recipients
                .into_iter()
                .map(|to| {
                    Message::new(
                        envelope.episode_id.clone(),
                        uuid::Uuid::new_v4().to_string(),
                        envelope.sender.clone(),
                        to,
                        envelope.payload.clone(),
                        ttl,
                    )
                })
                .collect(),
        };

        let mut admitted_ids = Vec::with_capacity(targets.len());
        let mut first_drop: Option<DropReason> = None;
        for mut message in targets {
            if let Err(reason) = self.admit_one(&mut state, &mut message) {
                self.shared.counters.record_drop(reason);
                first_drop.get_or_insert(reason);
                continue;
            }
            admitted_ids.push(message.msg_id.clone());
        }

        if admitted_ids.is_empty() {
            return Err(first_drop.unwrap_or(DropReason::QueueFull));
        }
        self.shared.counters.admitted.fetch_add(admitted_ids.len() as u64, Ordering::Relaxed);
        drop(state);
        self.shared.notify.notify_waiters();
        Ok(admitted_ids)
    }

    /// Dedup, epoch-stamp, queue-select, and append a single message.
    /// Must run under `state`'s lock: the `buffer_to_next` read and the
    /// enqueue it gates are one atomic region, or a message could be
    /// stamped with one epoch and enqueued under another.
    fn admit_one(&self, state: &mut RouterState, message: &mut Message) -> Result<(), DropReason> {
        let now = Instant::now();
        let duplicate =
            state.dedup.check_and_record(&message.recipient, &message.episode_id, &message.msg_id, now);
        if duplicate {
            return Err(DropReason::DedupDuplicate);
        }

        let stamp_epoch = if state.buffer_to_next { state.epoch + 1 } else { state.epoch };
        message.topo_epoch = stamp_epoch;

        let pair = state.queues.entry(message.recipient.clone()).or_default();
        let queue = if state.buffer_to_next { &mut pair.next } else { &mut pair.active };
        if queue.len() >= self.shared.limits.queue_capacity_per_receiver {
            return Err(DropReason::QueueFull);
        }
        queue.push_back(message.clone());
        Ok(())
    }

    /// Pop the oldest ready message for `recipient` from its active
    /// queue, dropping (not returning) any expired head messages first.
    /// Returns `None` if the queue is currently empty.
    pub async fn dequeue(&self, recipient: &str) -> Option<Message> {
        let mut state = self.shared.state.lock().await;
        let now = Instant::now();
        let pair = state.queues.get_mut(recipient)?;
        loop {
            let front_expired = matches!(pair.active.front(), Some(m) if m.is_expired_at(now));
            if front_expired {
                pair.active.pop_front();
                self.shared.counters.record_drop(DropReason::Expired);
                continue;
            }
            return pair.active.pop_front();
        }
    }

    /// Re-admit a message for retry: bump `attempt`/`redelivered`, drop
    /// it for good past `max_attempts`, and re-enqueue at the tail of the
    /// recipient's current active queue (no epoch re-stamp: retries stay
    /// in the epoch they were already committed to).
    pub async fn retry(&self, mut message: Message) -> Result<(), DropReason> {
        if message.attempt + 1 > self.shared.limits.max_attempts {
            self.shared.counters.record_drop(DropReason::MaxAttempts);
            return Err(DropReason::MaxAttempts);
        }
        message.mark_retried();

        let mut state = self.shared.state.lock().await;
        let pair = state.queues.entry(message.recipient.clone()).or_default();
        if pair.active.len() >= self.shared.limits.queue_capacity_per_receiver {
            drop(state);
            self.shared.counters.record_drop(DropReason::QueueFull);
            return Err(DropReason::QueueFull);
        }
        pair.active.push_back(message);
        drop(state);
        self.shared.notify.notify_waiters();
        Ok(())
    }

    /// Current active + next queue depths per recipient, for
    /// observability and for the Controller's queue-pressure features.
    pub async fn queue_depths(&self) -> HashMap<String, (usize, usize)> {
        let state = self.shared.state.lock().await;
        state.queues.iter().map(|(k, v)| (k.clone(), (v.active.len(), v.next.len()))).collect()
    }

    /// Block until `recipient`'s active queue is non-empty, then dequeue.
    /// Scale-appropriate (<=7 agents): a single shared `Notify` woken on
    /// every admission, not a per-recipient waiter list.
    pub async fn dequeue_wait(&self, recipient: &str) -> Message {
        loop {
            if let Some(message) = self.dequeue(recipient).await {
                return message;
            }
            self.shared.notify.notified().await;
        }
    }

    pub fn counters(&self) -> CountersSnapshot {
        let c = &self.shared.counters;
        CountersSnapshot {
            admitted: c.admitted.load(Ordering::Relaxed),
            dropped_invalid_payload: c.dropped_invalid_payload.load(Ordering::Relaxed),
            dropped_topology_violation: c.dropped_topology_violation.load(Ordering::Relaxed),
            dropped_queue_full: c.dropped_queue_full.load(Ordering::Relaxed),
            dropped_dedup_duplicate: c.dropped_dedup_duplicate.load(Ordering::Relaxed),
            dropped_expired: c.dropped_expired.load(Ordering::Relaxed),
            dropped_max_attempts: c.dropped_max_attempts.load(Ordering::Relaxed),
        }
    }

    /// Current `(topology, epoch)` pair, read atomically.
    pub async fn active(&self) -> (Topology, u64) {
        let state = self.shared.state.lock().await;
        (state.topology, state.epoch)
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
