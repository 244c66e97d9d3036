//! Component executor.
//!
//! Runs one Skill or Agent invocation as a loop of model turns. Before every
//! tool use and nested invocation the context checkpoint is polled and the
//! sandbox consulted. Model turns race the invocation's cancellation; tool
//! calls do not (a component mid-tool-call finishes that call, then stops).

use crate::config::{RuntimeConfig, TimeoutConfig};
use crate::context::InvocationContext;
use crate::descriptor::{ComponentDescriptor, ComponentKind};
use crate::error::DispatchError;
use crate::graph::InvocationGraph;
use crate::model::{ModelClient, ModelRequest, ModelTurn, ToolCall, ToolHost, TranscriptEntry};
use crate::report::{Finding, InvocationResult, InvocationStatus, Severity};
use crate::sandbox::CapabilitySandbox;
use crate::types::Capability;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of a nested call request.
#[derive(Debug)]
pub enum NestedOutcome {
    /// The call was dispatched, or refused by the graph controller
    Ran(InvocationResult),
    /// The target did not resolve (not found or disabled); nothing was dispatched
    Unresolved(DispatchError),
}

impl NestedOutcome {
    pub fn status(&self) -> InvocationStatus {
        match self {
            NestedOutcome::Ran(result) => result.status,
            NestedOutcome::Unresolved(err) => err.status(),
        }
    }
}

pub struct Executor {
    model: Arc<dyn ModelClient>,
    tools: Arc<dyn ToolHost>,
    sandbox: CapabilitySandbox,
    graph: InvocationGraph,
    timeouts: TimeoutConfig,
    cancel_grace: Duration,
}

impl Executor {
    pub fn new(
        model: Arc<dyn ModelClient>,
        tools: Arc<dyn ToolHost>,
        config: &RuntimeConfig,
    ) -> Self {
        Self {
            model,
            tools,
            sandbox: CapabilitySandbox::new(),
            graph: InvocationGraph::new(config.scheduler.max_depth),
            timeouts: config.timeouts.clone(),
            cancel_grace: config.scheduler.cancel_grace(),
        }
    }

    pub fn sandbox(&self) -> &CapabilitySandbox {
        &self.sandbox
    }

    pub fn graph(&self) -> &InvocationGraph {
        &self.graph
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    pub fn cancel_grace(&self) -> Duration {
        self.cancel_grace
    }

    /// Run a top-level Skill or Agent call. A backstop timer bounds the
    /// call even if a collaborator never yields.
    pub async fn run_root(
        &self,
        descriptor: &ComponentDescriptor,
        ctx: &InvocationContext,
        prompt: String,
    ) -> InvocationResult {
        let budget = ctx.remaining() + self.cancel_grace;
        let started = Instant::now();
        match tokio::time::timeout(budget, self.run(descriptor, ctx, prompt)).await {
            Ok(result) => result,
            Err(_) => {
                ctx.cancel();
                warn!(
                    call_id = %ctx.call_id(),
                    component = %descriptor.name,
                    tier = %descriptor.tier(),
                    "Invocation overran its deadline; backstop fired"
                );
                let mut result = InvocationResult::failed(
                    ctx.call_id(),
                    &descriptor.name,
                    descriptor.tier(),
                    InvocationStatus::Timeout,
                    "deadline exceeded while a collaborator call was in progress",
                );
                result.elapsed = started.elapsed();
                result
            }
        }
    }

    /// Run `descriptor` under `ctx`. Boxed because nested calls recurse.
    pub fn run<'a>(
        &'a self,
        descriptor: &'a ComponentDescriptor,
        ctx: &'a InvocationContext,
        prompt: String,
    ) -> BoxFuture<'a, InvocationResult> {
        Box::pin(async move {
            let started = Instant::now();
            debug!(
                call_id = %ctx.call_id(),
                component = %descriptor.name,
                tier = %descriptor.tier(),
                depth_remaining = ctx.depth_remaining(),
                "Dispatching invocation"
            );

            let mut result = match ctx.checkpoint() {
                Err(err) => InvocationResult::rejected(
                    ctx.call_id(),
                    &descriptor.name,
                    descriptor.tier(),
                    &err,
                ),
                Ok(()) => match &descriptor.kind {
                    ComponentKind::Skill(_) | ComponentKind::Agent(_) => {
                        self.model_loop(descriptor, ctx, prompt).await
                    }
                    ComponentKind::Command(_) => InvocationResult::failed(
                        ctx.call_id(),
                        &descriptor.name,
                        descriptor.tier(),
                        InvocationStatus::Error,
                        "commands run through the workflow runner",
                    ),
                },
            };
            result.elapsed = started.elapsed();

            info!(
                call_id = %ctx.call_id(),
                component = %descriptor.name,
                tier = %descriptor.tier(),
                status = %result.status,
                elapsed_ms = result.elapsed.as_millis() as u64,
                "Invocation finished"
            );
            result
        })
    }

    async fn model_loop(
        &self,
        descriptor: &ComponentDescriptor,
        ctx: &InvocationContext,
        prompt: String,
    ) -> InvocationResult {
        let mut result = InvocationResult::new(ctx.call_id(), &descriptor.name, descriptor.tier());
        let max_iterations = self.timeouts.iterations_for(descriptor);
        let mut transcript: Vec<TranscriptEntry> = Vec::new();

        for iteration in 0..max_iterations {
            if let Err(err) = ctx.checkpoint() {
                return stop(result, &err);
            }

            let request = ModelRequest {
                component: descriptor.name.clone(),
                tier: descriptor.tier(),
                model: descriptor.model.clone(),
                instructions: descriptor.instructions.clone(),
                prompt: prompt.clone(),
                allowed_tools: ctx.allowed_tools().clone(),
                transcript: transcript.clone(),
                iteration,
            };
            let turn = tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    let err = DispatchError::Timeout {
                        component: descriptor.name.clone(),
                    };
                    return stop(result, &err);
                }
                turn = self.model.next_turn(request) => turn,
            };

            match turn {
                Err(e) => {
                    result.status = InvocationStatus::Error;
                    result.reason = Some(e.to_string());
                    return result;
                }
                Ok(ModelTurn::Final(answer)) => {
                    result.findings.extend(answer.findings.into_iter().map(|mut f| {
                        if f.source_component.is_empty() {
                            f.source_component = descriptor.name.clone();
                        }
                        f
                    }));
                    result.output = Some(answer.summary);
                    return result;
                }
                Ok(ModelTurn::ToolUse(call)) => {
                    if let Err(err) = self.use_tool(descriptor, ctx, &call, &mut transcript).await {
                        return stop(result, &err);
                    }
                }
                Ok(ModelTurn::Invoke { target, prompt }) => {
                    if let Err(err) = ctx.checkpoint() {
                        return stop(result, &err);
                    }
                    if let Err(err) = self.sandbox.authorize(ctx, &Capability::invoke_component()) {
                        return stop(result, &err);
                    }
                    let outcome = self.invoke_nested(ctx, &target, prompt).await;
                    transcript.push(TranscriptEntry::InvokeResult {
                        target: target.clone(),
                        status: outcome.status(),
                        summary: match &outcome {
                            NestedOutcome::Ran(child) => {
                                child.output.clone().or(child.reason.clone())
                            }
                            NestedOutcome::Unresolved(err) => Some(err.to_string()),
                        },
                    });
                    match outcome {
                        NestedOutcome::Ran(child) => result.children.push(child),
                        NestedOutcome::Unresolved(err) => result.findings.push(Finding::failure(
                            &descriptor.name,
                            err.status(),
                            Severity::Low,
                            err.to_string(),
                        )),
                    }
                }
            }
        }

        result.status = InvocationStatus::Error;
        result.reason = Some(format!(
            "no final answer within {} iterations",
            max_iterations
        ));
        result
    }

    async fn use_tool(
        &self,
        descriptor: &ComponentDescriptor,
        ctx: &InvocationContext,
        call: &ToolCall,
        transcript: &mut Vec<TranscriptEntry>,
    ) -> Result<(), DispatchError> {
        ctx.checkpoint()?;
        self.sandbox.authorize(ctx, &call.capability)?;
        let entry = match self.tools.execute(&descriptor.name, call).await {
            Ok(output) => TranscriptEntry::ToolResult {
                capability: call.capability.clone(),
                output,
                is_error: false,
            },
            Err(e) => TranscriptEntry::ToolResult {
                capability: call.capability.clone(),
                output: e.to_string(),
                is_error: true,
            },
        };
        transcript.push(entry);
        Ok(())
    }

    /// Issue a nested call from `caller` to the component named `target`.
    pub async fn invoke_nested(
        &self,
        caller: &InvocationContext,
        target: &str,
        prompt: String,
    ) -> NestedOutcome {
        let callee = match self.graph.resolve_nested(caller, target) {
            Ok(callee) => callee,
            Err(err) => {
                warn!(
                    call_id = %caller.call_id(),
                    caller = %caller.current(),
                    target,
                    status = %err.status(),
                    "Nested call not dispatched"
                );
                return NestedOutcome::Unresolved(err);
            }
        };

        if let Err(err) = self.graph.check_nested(caller, &callee) {
            warn!(
                call_id = %caller.call_id(),
                caller = %caller.current(),
                target,
                status = %err.status(),
                reason = %err,
                "Nested call rejected"
            );
            return NestedOutcome::Ran(InvocationResult::rejected(
                Uuid::new_v4(),
                &callee.name,
                callee.tier(),
                &err,
            ));
        }

        let child = caller.child(&callee, self.timeouts.timeout_for(&callee));
        NestedOutcome::Ran(self.run(&callee, &child, prompt).await)
    }
}

/// End an invocation early with the status `err` maps to.
fn stop(mut result: InvocationResult, err: &DispatchError) -> InvocationResult {
    result.status = err.status();
    result.reason = Some(err.to_string());
    result
}
