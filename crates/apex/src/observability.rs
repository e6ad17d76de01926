// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal observability surface: `GET /metrics` (drop-reason counters,
//! per-recipient queue depths, current topology/epoch) and
//! `GET /healthz`. Built on the `axum` + `tower_http::trace` stack from
//! `crates/mux/src/transport/http.rs`, narrowed from a full proxy API to
//! a read-only exposition surface — this runtime has no
//! externally-driven request surface of its own.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router as AxumRouter};
use serde::Serialize;

use crate::router::Router;

#[derive(Clone)]
pub struct ObservabilityState {
    pub router: Router,
}

#[derive(Debug, Serialize)]
struct MetricsResponse {
    topology: &'static str,
    epoch: u64,
    counters: crate::router::CountersSnapshot,
    queue_depths: Vec<QueueDepth>,
}

#[derive(Debug, Serialize)]
struct QueueDepth {
    recipient: String,
    active: usize,
    next: usize,
}

async fn metrics(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    let (topology, epoch) = state.router.active().await;
    let depths = state.router.queue_depths().await;
    let queue_depths = depths
        .into_iter()
        .map(|(recipient, (active, next))| QueueDepth { recipient, active, next })
        .collect();

    Json(MetricsResponse {
        topology: topology.as_str(),
        epoch,
        counters: state.router.counters(),
        queue_depths,
    })
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn build_router(state: Arc<ObservabilityState>) -> AxumRouter {
    AxumRouter::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
#[path = "observability_tests.rs"]
mod tests;
