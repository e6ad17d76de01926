// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Narrow contracts for collaborators the core consumes but does not
//! implement: LLM backends, filesystem/test tool adapters, and the token
//! estimator. Full implementations (subprocess drivers, HTTP clients to a
//! model provider, sandboxed FS whitelisting) live outside this crate; the
//! mocks here exist only so the core's tests can exercise the contract.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CollaboratorStatus;

/// Result of a single, stateless `LlmClient::generate` call.
#[derive(Debug, Clone)]
pub struct LlmOutcome {
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub status: CollaboratorStatus,
}

/// An LLM backend. Calls must be stateless — session/context management is
/// the caller's concern, not the client's.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u64, timeout: Duration) -> LlmOutcome;
}

/// Structured result from a test-runner tool adapter.
#[derive(Debug, Clone, Default)]
pub struct TestRunOutcome {
    pub passed: u64,
    pub failed: u64,
    pub errors: u64,
    pub duration_s: f64,
}

/// Filesystem + test-runner tool adapter. Implementors must constrain all
/// path resolution to a whitelist root (rejecting escapes via symlinks),
/// perform writes atomically (temp file, fsync, atomic rename, cleanup on
/// failure), and reap child processes on timeout. None of that is
/// implemented here: the adapter is an external collaborator.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    async fn run_tests(&self, timeout: Duration) -> anyhow::Result<TestRunOutcome>;
}

/// Estimates token counts for a piece of text before a call is made, so the
/// Budget Guard can reserve against it. Contract: the estimate's bias on
/// realized counts must be non-negative — under-estimation would let a
/// reservation pass a budget check it should have failed.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> u64;
}

/// Conservative estimator: roughly 1 token per 3 characters, rounded up,
/// plus a 10% margin. Deliberately biased high.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConservativeEstimator;

impl TokenEstimator for ConservativeEstimator {
    fn estimate(&self, text: &str) -> u64 {
        let chars = text.chars().count() as u64;
        let base = chars.div_ceil(3);
        base + (base / 10) + 1
    }
}

#[cfg(test)]
#[path = "collaborators_tests.rs"]
mod tests;
