//! Error types for the runtime.
//!
//! `RuntimeError` is the crate-wide failure type. `DispatchError` covers every
//! reason an invocation is refused or cut short; each variant maps onto an
//! `InvocationStatus` so callers always get a result plus a reason.

use crate::report::InvocationStatus;
use crate::types::Capability;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Model collaborator error: {0}")]
    Model(String),

    #[error("Invalid invocation: {0}")]
    InvalidInvocation(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Skill queue is full ({0} pending)")]
    QueueFull(usize),

    #[error("Runtime is shut down")]
    ShutDown,
}

impl From<config::ConfigError> for RuntimeError {
    fn from(err: config::ConfigError) -> Self {
        RuntimeError::ConfigError(err.to_string())
    }
}

/// Reasons an invocation is refused before dispatch or aborted while running.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Component not found: {name}")]
    NotFound { name: String },

    #[error("Component '{name}' is disabled")]
    Disabled { name: String },

    #[error("Cycle detected: '{name}' already appears in call chain [{}]", .chain.join(" -> "))]
    CycleDetected { name: String, chain: Vec<String> },

    #[error("Tier violation: {from} '{caller}' may not invoke {to} '{target}'")]
    TierViolation {
        caller: String,
        from: String,
        target: String,
        to: String,
    },

    #[error("Command '{caller}' does not list agent '{target}' in its agents")]
    NotInvokable { caller: String, target: String },

    #[error("Nesting depth exhausted: '{caller}' cannot invoke '{target}' (max depth {max_depth})")]
    DepthExhausted {
        caller: String,
        target: String,
        max_depth: u32,
    },

    #[error("Permission violation: '{component}' may not use capability '{capability}'")]
    ToolNotAllowed {
        component: String,
        capability: Capability,
    },

    #[error("Invalid arguments for '{name}': {}", .errors.join("; "))]
    InvalidArguments { name: String, errors: Vec<String> },

    #[error("'{component}' exceeded its deadline")]
    Timeout { component: String },
}

impl DispatchError {
    /// Status reported in an `InvocationResult` (or step outcome) for this error.
    pub fn status(&self) -> InvocationStatus {
        match self {
            DispatchError::NotFound { .. } => InvocationStatus::NotFound,
            DispatchError::Disabled { .. } => InvocationStatus::Disabled,
            DispatchError::CycleDetected { .. } => InvocationStatus::CycleDetected,
            DispatchError::TierViolation { .. }
            | DispatchError::NotInvokable { .. }
            | DispatchError::DepthExhausted { .. }
            | DispatchError::ToolNotAllowed { .. } => InvocationStatus::PermissionViolation,
            DispatchError::InvalidArguments { .. } => InvocationStatus::Error,
            DispatchError::Timeout { .. } => InvocationStatus::Timeout,
        }
    }
}

/// A single descriptor failed validation. Reported per descriptor at load
/// time; never blocks the rest of the load.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("{}{}: {message}", .path.display(), .name.as_deref().map(|n| format!(" [{}]", n)).unwrap_or_default())]
pub struct ConfigValidationError {
    pub path: PathBuf,
    pub name: Option<String>,
    pub message: String,
}

impl ConfigValidationError {
    pub fn new(path: impl Into<PathBuf>, name: Option<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name,
            message: message.into(),
        }
    }
}
