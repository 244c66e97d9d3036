//! Runtime facade.
//!
//! Owns the registry handle, the executor and the skill pool, and exposes
//! the three entry points a host uses: trigger events, `@agent` calls and
//! `/command` runs.

use crate::config::RuntimeConfig;
use crate::context::InvocationContext;
use crate::descriptor::{BoundParams, ComponentDescriptor, FailurePolicy, StepAction};
use crate::error::{DispatchError, RuntimeError};
use crate::invocation::{parse_line, Invocation};
use crate::model::{ModelClient, SideTask, ToolHost};
use crate::registry::{LoadReport, Registry, Snapshot};
use crate::report::{aggregate, Finding, InvocationResult, InvocationStatus};
use crate::scheduler::{
    plan_waves, CommandReport, Executor, PoolStats, SkillJob, SkillPool, TaskRegistry,
    WorkflowRunner,
};
use crate::trigger::{TriggerEvent, TriggerMatcher};
use crate::types::{Capability, Tier};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of an executed invocation line
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Outcome {
    Agent(InvocationResult),
    Command(CommandReport),
}

impl Outcome {
    pub fn status(&self) -> InvocationStatus {
        match self {
            Outcome::Agent(result) => result.status,
            Outcome::Command(report) => report.status,
        }
    }

    pub fn findings(&self) -> Vec<Finding> {
        match self {
            Outcome::Agent(result) => aggregate(std::slice::from_ref(result)),
            Outcome::Command(report) => report.findings.clone(),
        }
    }
}

/// Skills dispatched for one event, still running
pub struct PendingSuggestions {
    event: TriggerEvent,
    entries: Vec<(Arc<ComponentDescriptor>, oneshot::Receiver<InvocationResult>)>,
}

impl PendingSuggestions {
    /// Names of the dispatched Skills in dispatch order
    pub fn matched(&self) -> Vec<&str> {
        self.entries.iter().map(|(d, _)| d.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Wait for every dispatched Skill. Results come back in dispatch order.
    pub async fn wait(self) -> EventReport {
        let mut results = Vec::with_capacity(self.entries.len());
        for (descriptor, receiver) in self.entries {
            let result = match receiver.await {
                Ok(result) => result,
                Err(_) => InvocationResult::failed(
                    Uuid::new_v4(),
                    &descriptor.name,
                    descriptor.tier(),
                    InvocationStatus::Error,
                    "skill result was dropped before completion",
                ),
            };
            results.push(result);
        }
        EventReport {
            findings: aggregate(&results),
            event: self.event,
            results,
        }
    }
}

/// Every Skill result for one event
#[derive(Debug, Clone, Serialize)]
pub struct EventReport {
    pub event: TriggerEvent,
    pub results: Vec<InvocationResult>,
    pub findings: Vec<Finding>,
}

/// Dry description of what an invocation line would do
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub component: String,
    pub tier: Tier,
    pub timeout: Duration,
    pub max_depth: u32,
    pub tools: BTreeSet<Capability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<BoundParams>,
    /// Command steps grouped into waves that may run together
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub waves: Vec<Vec<PlannedStep>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedStep {
    pub id: String,
    pub action: StepAction,
    pub policy: FailurePolicy,
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Set when the step would fail to resolve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeStats {
    pub snapshot_version: u64,
    pub components: usize,
    pub events: u64,
    pub agent_calls: u64,
    pub command_runs: u64,
    pub sandbox_violations: u64,
    pub pool: PoolStats,
}

#[derive(Debug, Default)]
struct Counters {
    events: AtomicU64,
    agent_calls: AtomicU64,
    command_runs: AtomicU64,
}

pub struct Runtime {
    registry: Arc<Registry>,
    config: RuntimeConfig,
    executor: Arc<Executor>,
    pool: SkillPool,
    matcher: TriggerMatcher,
    tasks: RwLock<TaskRegistry>,
    /// Parent of every call's token; replaced by `cancel_all`
    root_cancel: Mutex<CancellationToken>,
    counters: Counters,
}

impl Runtime {
    /// Build a runtime and start its skill workers. Must be called inside a
    /// Tokio runtime.
    pub fn new(
        registry: Arc<Registry>,
        model: Arc<dyn ModelClient>,
        tools: Arc<dyn ToolHost>,
        config: RuntimeConfig,
    ) -> Self {
        let executor = Arc::new(Executor::new(model, tools, &config));
        let pool = SkillPool::new(Arc::clone(&executor), &config.scheduler);
        pool.start();

        let workspace_root = config.registry.workspace_root.clone();
        let matcher = TriggerMatcher::new(
            (!workspace_root.as_os_str().is_empty()).then_some(workspace_root),
        );

        Self {
            registry,
            config,
            executor,
            pool,
            matcher,
            tasks: RwLock::new(TaskRegistry::new()),
            root_cancel: Mutex::new(CancellationToken::new()),
            counters: Counters::default(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.registry.snapshot()
    }

    /// Re-read descriptors. In-flight calls keep their snapshot.
    pub fn reload(&self) -> LoadReport {
        self.registry.reload(&self.config)
    }

    /// Make a side task available to workflow `task:` steps.
    pub fn register_task(&self, name: impl Into<String>, task: Arc<dyn SideTask>) {
        self.tasks.write().insert(name.into(), task);
    }

    fn call_token(&self) -> CancellationToken {
        self.root_cancel.lock().child_token()
    }

    /// Match `event` and enqueue every matching Skill. Returns once the
    /// Skills are queued; await [`PendingSuggestions::wait`] for results.
    pub async fn on_event(&self, event: TriggerEvent) -> Result<PendingSuggestions, RuntimeError> {
        self.counters.events.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.registry.snapshot();
        let matched = self.matcher.match_event(&snapshot, &event);
        debug!(
            kind = event.kind(),
            matched = matched.len(),
            version = snapshot.version(),
            "Trigger event matched"
        );
        if matched.is_empty() {
            return Ok(PendingSuggestions {
                event,
                entries: Vec::new(),
            });
        }

        let prompt = event.describe();
        let parent = self.call_token();
        let jobs = matched
            .iter()
            .map(|descriptor| SkillJob {
                descriptor: Arc::clone(descriptor),
                snapshot: Arc::clone(&snapshot),
                prompt: prompt.clone(),
                timeout: self.config.timeouts.timeout_for(descriptor),
                max_depth: self.executor.graph().max_depth(),
                cancel: parent.child_token(),
            })
            .collect();
        let receivers = self.pool.enqueue_batch(jobs).await?;

        Ok(PendingSuggestions {
            event,
            entries: matched.into_iter().zip(receivers).collect(),
        })
    }

    /// Explicit `@agent` call. Unknown or disabled agents are refused
    /// without producing a result.
    pub async fn call_agent(
        &self,
        name: &str,
        prompt: &str,
    ) -> Result<InvocationResult, DispatchError> {
        self.counters.agent_calls.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.registry.snapshot();
        let agent = self
            .executor
            .graph()
            .resolve_entry(&snapshot, name, Some(Tier::Agent))?;
        let ctx = InvocationContext::root(
            &agent,
            snapshot,
            self.config.timeouts.timeout_for(&agent),
            self.executor.graph().max_depth(),
            self.call_token(),
        );
        Ok(self.executor.run_root(&agent, &ctx, prompt.to_string()).await)
    }

    /// Explicit `/command` run with CLI-style arguments.
    pub async fn run_command(
        &self,
        name: &str,
        args: &[String],
    ) -> Result<CommandReport, DispatchError> {
        self.counters.command_runs.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.registry.snapshot();
        let command = self
            .executor
            .graph()
            .resolve_entry(&snapshot, name, Some(Tier::Command))?;
        let params = bind_params(&command, args)?;

        let ctx = InvocationContext::root(
            &command,
            snapshot,
            self.config.timeouts.timeout_for(&command),
            self.executor.graph().max_depth(),
            self.call_token(),
        );
        info!(call_id = %ctx.call_id(), command = %command.name, "Running command");

        let tasks = self.tasks.read().clone();
        let runner =
            WorkflowRunner::new(&self.executor, &tasks, self.config.scheduler.max_concurrency);
        // The runner stops waiting one grace period past the deadline and
        // keeps what finished; this only fires if the runner itself stalls.
        let budget = ctx.remaining() + self.executor.cancel_grace() * 2;

        match tokio::time::timeout(budget, runner.run(&command, &ctx, &params)).await {
            Ok(report) => Ok(report),
            Err(_) => {
                ctx.cancel();
                warn!(
                    call_id = %ctx.call_id(),
                    command = %command.name,
                    "Command overran its deadline; backstop fired"
                );
                Ok(CommandReport::failed(
                    &command.name,
                    ctx.call_id(),
                    InvocationStatus::Timeout,
                    "command deadline exceeded",
                ))
            }
        }
    }

    /// Parse and execute one `/command ...` or `@agent ...` line.
    pub async fn execute_line(&self, line: &str) -> Result<Outcome, RuntimeError> {
        match parse_line(line)? {
            Invocation::Command { name, args } => {
                Ok(Outcome::Command(self.run_command(&name, &args).await?))
            }
            Invocation::Agent { name, text } => {
                Ok(Outcome::Agent(self.call_agent(&name, &text).await?))
            }
        }
    }

    /// Describe what `line` would run without running it.
    pub fn plan(&self, line: &str) -> Result<Plan, RuntimeError> {
        let snapshot = self.registry.snapshot();
        let graph = self.executor.graph();
        let timeouts = &self.config.timeouts;

        let (descriptor, params) = match parse_line(line)? {
            Invocation::Agent { name, .. } => {
                (graph.resolve_entry(&snapshot, &name, Some(Tier::Agent))?, None)
            }
            Invocation::Command { name, args } => {
                let command = graph.resolve_entry(&snapshot, &name, Some(Tier::Command))?;
                let params = bind_params(&command, &args)?;
                (command, Some(params))
            }
        };

        let waves = match descriptor.as_command() {
            Some(spec) => plan_waves(&spec.steps)
                .into_iter()
                .map(|wave| {
                    wave.into_iter()
                        .filter_map(|id| spec.steps.iter().find(|s| s.id == id))
                        .map(|step| {
                            let (timeout, problem) = match &step.action {
                                StepAction::Agent(agent) => {
                                    match graph.resolve_entry(&snapshot, agent, Some(Tier::Agent)) {
                                        Ok(agent) => (Some(timeouts.timeout_for(&agent)), None),
                                        Err(err) => (None, Some(err.to_string())),
                                    }
                                }
                                StepAction::Task(task) => {
                                    let known = self.tasks.read().contains_key(task);
                                    let problem = (!known)
                                        .then(|| format!("side task '{}' is not registered", task));
                                    (None, problem)
                                }
                            };
                            PlannedStep {
                                id: step.id.clone(),
                                action: step.action.clone(),
                                policy: step.policy,
                                depends_on: step.depends_on.clone(),
                                timeout,
                                problem,
                            }
                        })
                        .collect()
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(Plan {
            component: descriptor.name.clone(),
            tier: descriptor.tier(),
            timeout: timeouts.timeout_for(&descriptor),
            max_depth: graph.max_depth(),
            tools: descriptor.tools.clone(),
            params,
            waves,
        })
    }

    /// Cancel every call in flight or queued. Later calls are unaffected.
    pub fn cancel_all(&self) {
        let previous = std::mem::replace(&mut *self.root_cancel.lock(), CancellationToken::new());
        previous.cancel();
        info!("Cancelled all in-flight invocations");
    }

    /// Cancel everything and stop the skill workers.
    pub async fn shutdown(&self) {
        self.cancel_all();
        self.pool.stop().await;
    }

    pub fn stats(&self) -> RuntimeStats {
        let snapshot = self.registry.snapshot();
        RuntimeStats {
            snapshot_version: snapshot.version(),
            components: snapshot.len(),
            events: self.counters.events.load(Ordering::Relaxed),
            agent_calls: self.counters.agent_calls.load(Ordering::Relaxed),
            command_runs: self.counters.command_runs.load(Ordering::Relaxed),
            sandbox_violations: self.executor.sandbox().violations(),
            pool: self.pool.stats(),
        }
    }
}

fn bind_params(
    command: &ComponentDescriptor,
    args: &[String],
) -> Result<BoundParams, DispatchError> {
    let Some(spec) = command.as_command() else {
        return Ok(BoundParams::new());
    };
    spec.parameters
        .bind(args)
        .map_err(|errors| DispatchError::InvalidArguments {
            name: command.name.clone(),
            errors,
        })
}
