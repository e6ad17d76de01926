// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topology Guard: a pure function validating `(sender, recipient(s),
//! topology)` and computing routing intent. Never mutates Router state —
//! the Router calls it once per admission and acts on the returned
//! `RoutingIntent`.

use serde::{Deserialize, Serialize};

use crate::error::DropReason;

/// The three runtime-switchable communication topologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    Star,
    Chain,
    Flat,
}

impl Topology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Star => "star",
            Self::Chain => "chain",
            Self::Flat => "flat",
        }
    }
}

/// The fixed role cycle used by the Chain topology: Planner -> Coder ->
/// Runner -> Critic -> Summarizer -> Planner. External senders not in this
/// set must address the entry role, Planner (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Planner,
    Coder,
    Runner,
    Critic,
    Summarizer,
}

impl Role {
    pub const CYCLE: [Role; 5] = [Role::Planner, Role::Coder, Role::Runner, Role::Critic, Role::Summarizer];

    pub fn from_agent_id(id: &str) -> Option<Role> {
        match id {
            "planner" => Some(Role::Planner),
            "coder" => Some(Role::Coder),
            "runner" => Some(Role::Runner),
            "critic" => Some(Role::Critic),
            "summarizer" => Some(Role::Summarizer),
            _ => None,
        }
    }

    pub fn as_agent_id(&self) -> &'static str {
        match self {
            Role::Planner => "planner",
            Role::Coder => "coder",
            Role::Runner => "runner",
            Role::Critic => "critic",
            Role::Summarizer => "summarizer",
        }
    }

    /// The next hop in the fixed Chain cycle.
    pub fn next_hop(&self) -> Role {
        let idx = Self::CYCLE.iter().position(|r| r == self).unwrap_or(0);
        Self::CYCLE[(idx + 1) % Self::CYCLE.len()]
    }

    pub fn entry() -> Role {
        Role::Planner
    }
}

/// What a recipient looks like on ingress: a single agent, or (Flat only)
/// a list of peers.
#[derive(Debug, Clone)]
pub enum RecipientSpec<'a> {
    Single(&'a str),
    List(&'a [String]),
}

/// Routing decision computed by the guard; the Router executes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingIntent {
    Direct { to: String },
    RouteViaHub { hub: String, forward_to: String },
    Fanout { recipients: Vec<String> },
}

/// Validate an admission request and compute its routing intent. Pure:
/// takes all inputs explicitly, mutates nothing.
pub fn validate(
    topology: Topology,
    hub: &str,
    sender: &str,
    recipient: RecipientSpec<'_>,
    fanout_limit: usize,
) -> Result<RoutingIntent, DropReason> {
    match topology {
        Topology::Star => validate_star(hub, sender, recipient),
        Topology::Chain => validate_chain(sender, recipient),
        Topology::Flat => validate_flat(sender, recipient, fanout_limit),
    }
}

fn validate_star(hub: &str, sender: &str, recipient: RecipientSpec<'_>) -> Result<RoutingIntent, DropReason> {
    let RecipientSpec::Single(to) = recipient else {
        return Err(DropReason::TopologyViolation);
    };

    if sender == hub || to == hub {
        return Ok(RoutingIntent::Direct { to: to.to_owned() });
    }

    // Neither end is the hub: rewrite to a single message addressed to the
    // hub, carrying a `forward_to` hint. Never duplicate.
    Ok(RoutingIntent::RouteViaHub { hub: hub.to_owned(), forward_to: to.to_owned() })
}

fn validate_chain(sender: &str, recipient: RecipientSpec<'_>) -> Result<RoutingIntent, DropReason> {
    let RecipientSpec::Single(to) = recipient else {
        return Err(DropReason::TopologyViolation);
    };

    let expected = match Role::from_agent_id(sender) {
        Some(role) => role.next_hop(),
        // External senders (not in the role set) must enter at Planner.
        None => Role::entry(),
    };

    if to == expected.as_agent_id() {
        Ok(RoutingIntent::Direct { to: to.to_owned() })
    } else {
        Err(DropReason::TopologyViolation)
    }
}

fn validate_flat(
    sender: &str,
    recipient: RecipientSpec<'_>,
    fanout_limit: usize,
) -> Result<RoutingIntent, DropReason> {
    let RecipientSpec::List(recipients) = recipient else {
        return Err(DropReason::TopologyViolation);
    };

    if recipients.is_empty() || recipients.len() > fanout_limit {
        return Err(DropReason::TopologyViolation);
    }
    if recipients.iter().any(|r| r == sender) {
        return Err(DropReason::TopologyViolation);
    }

    Ok(RoutingIntent::Fanout { recipients: recipients.to_vec() })
}

#[cfg(test)]
#[path = "topology_tests.rs"]
mod tests;
