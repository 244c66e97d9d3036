//! External collaborators: the model that turns a prompt into actions, the
//! host that performs tool calls, and caller-declared side tasks.
//!
//! The runtime treats all three as opaque. Their latency is bounded only by
//! the invocation deadline.

use crate::descriptor::BoundParams;
use crate::error::RuntimeError;
use crate::report::{Finding, InvocationStatus};
use crate::types::{Capability, Tier};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;

/// One request for the next model turn.
#[derive(Debug, Clone, Serialize)]
pub struct ModelRequest {
    pub component: String,
    pub tier: Tier,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub prompt: String,
    pub allowed_tools: BTreeSet<Capability>,
    /// Everything that happened in earlier turns of this invocation
    pub transcript: Vec<TranscriptEntry>,
    /// Zero-based turn number
    pub iteration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub capability: Capability,
    #[serde(default)]
    pub input: serde_json::Value,
}

impl ToolCall {
    pub fn new(capability: impl Into<Capability>, input: serde_json::Value) -> Self {
        Self {
            capability: capability.into(),
            input,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
}

/// What the model wants to do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelTurn {
    ToolUse(ToolCall),
    /// Nested call to another component (needs `invoke-component`)
    Invoke { target: String, prompt: String },
    Final(FinalAnswer),
}

/// Record of one completed turn, fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEntry {
    ToolResult {
        capability: Capability,
        output: String,
        is_error: bool,
    },
    InvokeResult {
        target: String,
        status: InvocationStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn next_turn(&self, request: ModelRequest) -> Result<ModelTurn, RuntimeError>;
}

/// Performs tool calls the sandbox already authorised.
#[async_trait]
pub trait ToolHost: Send + Sync {
    async fn execute(&self, component: &str, call: &ToolCall) -> Result<String, RuntimeError>;
}

/// Input of a side-task workflow step
#[derive(Debug, Clone, Serialize)]
pub struct TaskInput {
    pub command: String,
    pub step: String,
    pub prompt: String,
    pub params: BoundParams,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskOutput {
    pub summary: String,
    pub findings: Vec<Finding>,
}

/// Caller-declared workflow step, registered on the runtime by name.
///
/// `cancel` fires when the step's command aborts or its deadline passes;
/// tasks should stop at their next convenient point.
#[async_trait]
pub trait SideTask: Send + Sync {
    async fn run(
        &self,
        input: TaskInput,
        cancel: CancellationToken,
    ) -> Result<TaskOutput, RuntimeError>;
}

/// Model that answers immediately without doing anything. Backs offline runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunModel;

#[async_trait]
impl ModelClient for DryRunModel {
    async fn next_turn(&self, request: ModelRequest) -> Result<ModelTurn, RuntimeError> {
        let tools: Vec<&str> = request.allowed_tools.iter().map(Capability::as_str).collect();
        Ok(ModelTurn::Final(FinalAnswer {
            summary: format!(
                "dry run: {} {} (model {}, tools [{}]) would handle: {}",
                request.tier,
                request.component,
                request.model,
                tools.join(", "),
                first_line(&request.prompt)
            ),
            findings: Vec::new(),
        }))
    }
}

/// Tool host that performs nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopToolHost;

#[async_trait]
impl ToolHost for NoopToolHost {
    async fn execute(&self, _component: &str, call: &ToolCall) -> Result<String, RuntimeError> {
        Ok(format!("{}: not executed", call.capability))
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}
