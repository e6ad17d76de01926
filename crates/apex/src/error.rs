// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the router, switch engine, coordinator, and
//! budget guard. Recoverable categories are returned as structured results;
//! only invariant violations are fatal.

use std::fmt;

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

/// Reasons a message was rejected at admission, or dropped after admission.
/// Drop reasons are never raised as errors — they are recorded on the
/// message (`Message::drop_reason`) and surfaced via counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Payload exceeded `payload_max_bytes`.
    InvalidPayload,
    /// Topology Guard rejected the (sender, recipient) pair.
    TopologyViolation,
    /// The target queue was at `queue_capacity_per_receiver`.
    QueueFull,
    /// `(episode_id, msg_id)` already seen for this recipient.
    DedupDuplicate,
    /// `now > expires_ts` at dequeue time.
    Expired,
    /// `attempt` exceeded `max_attempts` on retry.
    MaxAttempts,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidPayload => "invalid_payload",
            Self::TopologyViolation => "topology_violation",
            Self::QueueFull => "queue_full",
            Self::DedupDuplicate => "dedup_duplicate",
            Self::Expired => "expired",
            Self::MaxAttempts => "max_attempts",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of `Coordinator::request_switch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SwitchOutcome {
    Committed { epoch: u64 },
    Aborted { reason: AbortReason },
    Deferred { reason: DeferReason },
    Rejected { reason: RejectReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferReason {
    InFlight,
    Health,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Dwell,
    Cooldown,
}

/// Why a switch attempt aborted instead of committing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    QuiesceTimeout,
    CrashRestart,
    PrepareTimeout,
}

/// Reason a budget scope denied a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetDenyReason {
    TokHeadroom,
    MsHeadroom,
}

/// Outcome surfaced by an LLM/tool collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaboratorStatus {
    Ok,
    Timeout,
    Error,
    BudgetDenied,
}

/// Unrecoverable invariant violations. The process logs and exits; these
/// must never be reachable in a correct implementation, but are named so a
/// violation is loud rather than silently swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalError {
    EpochRegression,
    UnknownTopology,
    LockPoisoned,
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EpochRegression => "epoch regression observed",
            Self::UnknownTopology => "unknown topology requested",
            Self::LockPoisoned => "internal lock poisoned",
        };
        f.write_str(s)
    }
}

impl std::error::Error for FatalError {}

/// Log a fatal invariant violation and terminate the process. Never called
/// from reachable code paths; exists so a violation is unmistakable rather
/// than panicking through an arbitrary task.
pub fn abort_on_fatal(err: FatalError) -> ! {
    tracing::error!(error = %err, "fatal invariant violation, aborting process");
    std::process::exit(1);
}

/// HTTP-facing error code for the observability surface (`/metrics`,
/// `/healthz`). Distinct from the core's drop-reason/switch-outcome
/// taxonomy above, which never crosses an HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiError {
    BadRequest,
    Internal,
}

impl ApiError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_http_response(&self, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse {
            error: ErrorBody { code: self.as_str().to_owned(), message: message.into() },
        };
        (status, Json(body))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
