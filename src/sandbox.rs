//! Capability Sandbox
//!
//! Every tool use is checked against the invocation's effective tool set,
//! which is the intersection of the component's own allow-list and every
//! ancestor's. A callee can never hold a capability its caller lacks.

use crate::context::InvocationContext;
use crate::descriptor::ComponentDescriptor;
use crate::error::DispatchError;
use crate::types::Capability;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

#[derive(Debug, Default)]
pub struct CapabilitySandbox {
    violations: AtomicU64,
}

impl CapabilitySandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective tools of `callee` when called with `inherited` in effect.
    pub fn effective_tools(
        inherited: Option<&BTreeSet<Capability>>,
        callee: &ComponentDescriptor,
    ) -> BTreeSet<Capability> {
        match inherited {
            Some(parent) => parent.intersection(&callee.tools).cloned().collect(),
            None => callee.tools.clone(),
        }
    }

    /// Authorise one tool use. On refusal the tool call is not performed and
    /// the executor ends the component with `permissionViolation`.
    pub fn authorize(
        &self,
        ctx: &InvocationContext,
        capability: &Capability,
    ) -> Result<(), DispatchError> {
        if ctx.allows(capability) {
            return Ok(());
        }
        self.violations.fetch_add(1, Ordering::Relaxed);
        let current = ctx.current();
        warn!(
            call_id = %ctx.call_id(),
            component = %current.name,
            tier = %current.tier,
            capability = %capability,
            "Sandbox refused tool use"
        );
        Err(DispatchError::ToolNotAllowed {
            component: current.name.clone(),
            capability: capability.clone(),
        })
    }

    /// Refusals since start
    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }
}
