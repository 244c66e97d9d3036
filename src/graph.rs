//! Invocation Graph Controller
//!
//! Decides whether a call may be dispatched at all. Top-level calls are
//! resolved against the snapshot; nested calls are additionally checked, in
//! order, for a cycle in the caller chain, a legal tier edge, the command's
//! agent list, and remaining depth. Every check is data: nothing here depends
//! on how deep the Rust call stack happens to be.

use crate::context::InvocationContext;
use crate::descriptor::ComponentDescriptor;
use crate::error::DispatchError;
use crate::registry::Snapshot;
use crate::types::Tier;
use std::sync::Arc;
use tracing::debug;

/// The only legal call directions.
pub const LEGAL_EDGES: &[(Tier, Tier)] = &[
    (Tier::Command, Tier::Agent),
    (Tier::Agent, Tier::Skill),
];

pub fn is_legal_edge(from: Tier, to: Tier) -> bool {
    LEGAL_EDGES.iter().any(|&(f, t)| f == from && t == to)
}

/// Tier a caller of tier `from` may invoke, if any
pub fn callee_tier(from: Tier) -> Option<Tier> {
    LEGAL_EDGES
        .iter()
        .find(|(f, _)| *f == from)
        .map(|&(_, to)| to)
}

/// Invocation graph rules for one runtime.
#[derive(Debug, Clone, Copy)]
pub struct InvocationGraph {
    max_depth: u32,
}

impl InvocationGraph {
    pub fn new(max_depth: u32) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Resolve a top-level call. `tier` narrows the lookup (a `/name` line
    /// only ever means a Command).
    pub fn resolve_entry(
        &self,
        snapshot: &Snapshot,
        name: &str,
        tier: Option<Tier>,
    ) -> Result<Arc<ComponentDescriptor>, DispatchError> {
        let found = match tier {
            Some(tier) => snapshot.get(tier, name),
            None => snapshot.resolve(name, None),
        };
        usable(found, name)
    }

    /// Resolve the target of a nested call issued from `caller`. The tier the
    /// caller may legally reach is preferred; other tiers still resolve so
    /// that an illegal edge is reported as such rather than as not-found.
    pub fn resolve_nested(
        &self,
        caller: &InvocationContext,
        name: &str,
    ) -> Result<Arc<ComponentDescriptor>, DispatchError> {
        let preferred = callee_tier(caller.current().tier);
        usable(caller.snapshot().resolve(name, preferred), name)
    }

    /// Graph checks for a nested call: cycle, tier edge, agent list, depth.
    pub fn check_nested(
        &self,
        caller: &InvocationContext,
        target: &ComponentDescriptor,
    ) -> Result<(), DispatchError> {
        let from = caller.current();
        let to = target.tier();

        if caller.contains(to, &target.name) {
            debug!(caller = %from, target = %target.name, "Cycle detected");
            return Err(DispatchError::CycleDetected {
                name: target.name.clone(),
                chain: caller.chain_names(),
            });
        }

        if !is_legal_edge(from.tier, to) {
            return Err(DispatchError::TierViolation {
                caller: from.name.clone(),
                from: from.tier.to_string(),
                target: target.name.clone(),
                to: to.to_string(),
            });
        }

        if from.tier == Tier::Command {
            let listed = caller
                .snapshot()
                .get(Tier::Command, &from.name)
                .and_then(|d| d.as_command())
                .is_some_and(|spec| spec.may_invoke(&target.name));
            if !listed {
                return Err(DispatchError::NotInvokable {
                    caller: from.name.clone(),
                    target: target.name.clone(),
                });
            }
        }

        if caller.depth_remaining() == 0 {
            return Err(DispatchError::DepthExhausted {
                caller: from.name.clone(),
                target: target.name.clone(),
                max_depth: self.max_depth,
            });
        }

        Ok(())
    }
}

fn usable(
    found: Option<&Arc<ComponentDescriptor>>,
    name: &str,
) -> Result<Arc<ComponentDescriptor>, DispatchError> {
    match found {
        None => Err(DispatchError::NotFound {
            name: name.to_string(),
        }),
        Some(d) if !d.enabled => Err(DispatchError::Disabled {
            name: name.to_string(),
        }),
        Some(d) => Ok(d.clone()),
    }
}
