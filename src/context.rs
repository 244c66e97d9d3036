//! Invocation context: identity, call chain, depth budget, deadline,
//! cancellation token and effective tool set of one invocation.
//!
//! A top-level call creates the root context; every nested call derives a
//! child with a fresh call id, one more chain entry, one less depth, a
//! deadline no later than its parent's, a child cancellation token, and the
//! intersection of the parent's and callee's tools. Cancelling a context
//! cancels its whole subtree and never its ancestors.

use crate::descriptor::ComponentDescriptor;
use crate::error::DispatchError;
use crate::registry::Snapshot;
use crate::sandbox::CapabilitySandbox;
use crate::types::{CallId, Capability, Tier};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One entry of the caller chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CallFrame {
    pub tier: Tier,
    pub name: String,
}

impl fmt::Display for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tier, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct InvocationContext {
    call_id: CallId,
    root_id: CallId,
    /// Callers then the current component (always last)
    chain: Vec<CallFrame>,
    depth_remaining: u32,
    deadline: Instant,
    cancel: CancellationToken,
    allowed_tools: BTreeSet<Capability>,
    snapshot: Arc<Snapshot>,
}

impl InvocationContext {
    /// Context of a top-level call.
    pub fn root(
        descriptor: &ComponentDescriptor,
        snapshot: Arc<Snapshot>,
        timeout: Duration,
        max_depth: u32,
        cancel: CancellationToken,
    ) -> Self {
        let call_id = Uuid::new_v4();
        Self {
            call_id,
            root_id: call_id,
            chain: vec![CallFrame {
                tier: descriptor.tier(),
                name: descriptor.name.clone(),
            }],
            depth_remaining: max_depth,
            deadline: deadline_after(Instant::now(), timeout),
            cancel,
            allowed_tools: CapabilitySandbox::effective_tools(None, descriptor),
            snapshot,
        }
    }

    /// Context of a nested call to `callee` issued from this context.
    pub fn child(&self, callee: &ComponentDescriptor, timeout: Duration) -> Self {
        let mut chain = self.chain.clone();
        chain.push(CallFrame {
            tier: callee.tier(),
            name: callee.name.clone(),
        });
        Self {
            call_id: Uuid::new_v4(),
            root_id: self.root_id,
            chain,
            depth_remaining: self.depth_remaining.saturating_sub(1),
            deadline: self.deadline.min(deadline_after(Instant::now(), timeout)),
            cancel: self.cancel.child_token(),
            allowed_tools: CapabilitySandbox::effective_tools(Some(&self.allowed_tools), callee),
            snapshot: self.snapshot.clone(),
        }
    }

    /// Same call, with its own cancellation scope below this one. Used to
    /// cancel one workflow step without cancelling the command.
    pub fn scoped(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Call id of the top-level call this context descends from
    pub fn root_id(&self) -> CallId {
        self.root_id
    }

    pub fn chain(&self) -> &[CallFrame] {
        &self.chain
    }

    pub fn chain_names(&self) -> Vec<String> {
        self.chain.iter().map(|f| f.name.clone()).collect()
    }

    /// The component this context belongs to
    pub fn current(&self) -> &CallFrame {
        // chain is never empty: root() seeds it and child() only appends
        &self.chain[self.chain.len() - 1]
    }

    pub fn contains(&self, tier: Tier, name: &str) -> bool {
        self.chain.iter().any(|f| f.tier == tier && f.name == name)
    }

    pub fn depth_remaining(&self) -> u32 {
        self.depth_remaining
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn allowed_tools(&self) -> &BTreeSet<Capability> {
        &self.allowed_tools
    }

    pub fn allows(&self, capability: &Capability) -> bool {
        self.allowed_tools.contains(capability)
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel this call and every call below it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cooperative checkpoint, polled before every tool call and nested
    /// invocation. An expired deadline cancels the subtree.
    pub fn checkpoint(&self) -> Result<(), DispatchError> {
        if self.is_expired() {
            self.cancel.cancel();
        }
        if self.cancel.is_cancelled() {
            return Err(DispatchError::Timeout {
                component: self.current().name.clone(),
            });
        }
        Ok(())
    }

    /// Resolves once the call is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep_until(self.deadline) => {
                self.cancel.cancel();
            }
        }
    }
}

fn deadline_after(now: Instant, timeout: Duration) -> Instant {
    // Saturate absurd timeouts instead of overflowing Instant.
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365))
}
