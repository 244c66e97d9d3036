//! Command workflows.
//!
//! A Command's steps form a DAG. A step starts once every dependency has
//! succeeded; at most `max_concurrency` steps are in flight. A failed
//! best-effort step becomes a finding and the workflow continues, and steps
//! depending on it are skipped. A failed required step stops the workflow:
//! nothing new starts and in-flight steps are cancelled.

use super::executor::{Executor, NestedOutcome};
use crate::context::InvocationContext;
use crate::descriptor::{
    render_value, BoundParams, ComponentDescriptor, FailurePolicy, StepAction, WorkflowStep,
};
use crate::model::{SideTask, TaskInput};
use crate::report::{Finding, InvocationResult, InvocationStatus, ReportAggregator, Severity};
use crate::types::CallId;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Side tasks available to workflow steps, by name
pub type TaskRegistry = HashMap<String, Arc<dyn SideTask>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "status", rename_all = "kebab-case")]
pub enum StepStatus {
    Succeeded,
    Failed(InvocationStatus),
    /// Not started: a dependency failed, or the workflow stopped first
    Skipped,
    /// Stopped while in flight after a required step failed
    Cancelled,
}

impl StepStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, StepStatus::Succeeded)
    }

    pub fn label(&self) -> String {
        match self {
            StepStatus::Succeeded => "succeeded".to_string(),
            StepStatus::Failed(status) => format!("failed ({})", status),
            StepStatus::Skipped => "skipped".to_string(),
            StepStatus::Cancelled => "cancelled".to_string(),
        }
    }
}

/// What happened to one step
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub id: String,
    pub target: String,
    pub policy: FailurePolicy,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub elapsed: Duration,
}

/// Result of one Command run
#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub call_id: CallId,
    pub status: InvocationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Aggregated across every step, de-duplicated, severity descending
    pub findings: Vec<Finding>,
    /// In declaration order
    pub steps: Vec<StepOutcome>,
    pub failed_steps: Vec<String>,
    /// Agent step results in declaration order
    pub results: Vec<InvocationResult>,
    pub elapsed: Duration,
}

impl CommandReport {
    /// Report for a command refused or cut short before any step ran.
    pub fn failed(
        command: impl Into<String>,
        call_id: CallId,
        status: InvocationStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            call_id,
            status,
            reason: Some(reason.into()),
            findings: Vec::new(),
            steps: Vec::new(),
            failed_steps: Vec::new(),
            results: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn invocation_count(&self) -> usize {
        self.results.iter().map(InvocationResult::invocation_count).sum()
    }
}

/// One finished step, before it is recorded
struct StepRun {
    index: usize,
    status: InvocationStatus,
    reason: Option<String>,
    output: Option<String>,
    findings: Vec<Finding>,
    result: Option<InvocationResult>,
    elapsed: Duration,
}

pub struct WorkflowRunner<'a> {
    executor: &'a Executor,
    tasks: &'a TaskRegistry,
    max_concurrency: usize,
}

impl<'a> WorkflowRunner<'a> {
    pub fn new(executor: &'a Executor, tasks: &'a TaskRegistry, max_concurrency: usize) -> Self {
        Self {
            executor,
            tasks,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Run `command` under its root context `ctx` with already-bound params.
    pub async fn run(
        &self,
        command: &ComponentDescriptor,
        ctx: &InvocationContext,
        params: &BoundParams,
    ) -> CommandReport {
        let started = Instant::now();
        let Some(spec) = command.as_command() else {
            return CommandReport::failed(
                &command.name,
                ctx.call_id(),
                InvocationStatus::Error,
                format!("'{}' is not a command", command.name),
            );
        };
        let steps = &spec.steps;
        let n = steps.len();
        let index_of: HashMap<&str, usize> =
            steps.iter().enumerate().map(|(i, s)| (s.id.as_str(), i)).collect();

        let mut runs: Vec<Option<StepRun>> = (0..n).map(|_| None).collect();
        let mut states: Vec<Option<StepStatus>> = vec![None; n];
        let mut launched = vec![false; n];
        let mut outputs: HashMap<String, String> = HashMap::new();
        let mut tokens: HashMap<usize, CancellationToken> = HashMap::new();
        let mut abort: Option<(String, InvocationStatus)> = None;
        let mut in_flight = FuturesUnordered::new();
        let mut overran = false;
        // Tool calls are not raced against the deadline; stop waiting on
        // steps stuck in one once the grace period is spent.
        let backstop = tokio::time::sleep_until(ctx.deadline() + self.executor.cancel_grace());
        tokio::pin!(backstop);

        loop {
            if abort.is_none() {
                skip_blocked(steps, &index_of, &mut states, &mut launched);

                for i in 0..n {
                    if in_flight.len() >= self.max_concurrency {
                        break;
                    }
                    let ready = !launched[i]
                        && steps[i].depends_on.iter().all(|d| {
                            index_of
                                .get(d.as_str())
                                .is_some_and(|&j| states[j] == Some(StepStatus::Succeeded))
                        });
                    if !ready {
                        continue;
                    }
                    launched[i] = true;
                    let step_ctx = ctx.scoped();
                    tokens.insert(i, step_ctx.cancel_token().clone());
                    let prompt = step_prompt(command, &steps[i], params, &outputs);
                    debug!(
                        call_id = %ctx.call_id(),
                        command = %command.name,
                        step = %steps[i].id,
                        "Starting workflow step"
                    );
                    in_flight.push(self.run_step(i, command, &steps[i], step_ctx, prompt, params));
                }
            }

            let next = tokio::select! {
                biased;
                run = in_flight.next() => run,
                _ = &mut backstop => {
                    overran = true;
                    None
                }
            };
            let Some(run) = next else {
                break;
            };
            tokens.remove(&run.index);
            let step = &steps[run.index];

            let state = settled_state(run.status, abort.is_some());
            if state.is_success() {
                if let Some(output) = &run.output {
                    outputs.insert(step.id.clone(), output.clone());
                }
            }

            if let StepStatus::Failed(status) = state {
                warn!(
                    call_id = %ctx.call_id(),
                    command = %command.name,
                    step = %step.id,
                    status = %status,
                    policy = ?step.policy,
                    reason = run.reason.as_deref().unwrap_or(""),
                    "Workflow step failed"
                );
                if step.policy == FailurePolicy::Required {
                    abort = Some((step.id.clone(), status));
                    for token in tokens.values() {
                        token.cancel();
                    }
                }
            }

            let index = run.index;
            states[index] = Some(state);
            runs[index] = Some(run);
        }

        if overran {
            ctx.cancel();
            drop(in_flight);
            for (i, step) in steps.iter().enumerate() {
                if !launched[i] || states[i].is_some() {
                    continue;
                }
                warn!(
                    call_id = %ctx.call_id(),
                    command = %command.name,
                    step = %step.id,
                    "Workflow step abandoned at the command deadline"
                );
                states[i] = Some(StepStatus::Failed(InvocationStatus::Timeout));
                runs[i] = Some(StepRun {
                    index: i,
                    status: InvocationStatus::Timeout,
                    reason: Some("step did not finish before the command deadline".to_string()),
                    output: None,
                    findings: Vec::new(),
                    result: None,
                    elapsed: started.elapsed(),
                });
            }
        }

        // Anything never launched was blocked or stopped by an abort
        for state in states.iter_mut() {
            if state.is_none() {
                *state = Some(StepStatus::Skipped);
            }
        }

        let mut aggregator = ReportAggregator::new();
        let mut outcomes = Vec::with_capacity(n);
        let mut results = Vec::new();
        let mut failed_steps = Vec::new();
        let mut warnings = false;

        for (i, (step, run)) in steps.iter().zip(runs).enumerate() {
            let status = states[i].unwrap_or(StepStatus::Skipped);
            let target = step.action.target().to_string();
            let mut outcome = StepOutcome {
                id: step.id.clone(),
                target: target.clone(),
                policy: step.policy,
                status,
                reason: None,
                output: None,
                elapsed: Duration::ZERO,
            };

            if let Some(run) = run {
                if let Some(result) = &run.result {
                    aggregator.add_result(result);
                }
                aggregator.add_findings(run.findings);
                outcome.reason = run.reason.clone();
                outcome.output = run.output;
                outcome.elapsed = run.elapsed;
                if let Some(result) = run.result {
                    results.push(result);
                }
            }

            match status {
                StepStatus::Failed(failed) => {
                    failed_steps.push(step.id.clone());
                    let severity = match step.policy {
                        FailurePolicy::Required => Severity::High,
                        FailurePolicy::BestEffort => {
                            warnings = true;
                            Severity::Medium
                        }
                    };
                    aggregator.add_finding(Finding::failure(
                        &target,
                        failed,
                        severity,
                        format!(
                            "step '{}' failed: {}",
                            step.id,
                            outcome.reason.as_deref().unwrap_or(failed.as_str())
                        ),
                    ));
                }
                StepStatus::Skipped => {
                    warnings = true;
                    if outcome.reason.is_none() {
                        outcome.reason = Some(match &abort {
                            Some((id, _)) => format!("not started: required step '{}' failed", id),
                            None => "not started: a dependency did not succeed".to_string(),
                        });
                    }
                }
                StepStatus::Cancelled => {
                    if let Some((id, _)) = &abort {
                        outcome.reason = Some(format!("cancelled: required step '{}' failed", id));
                    }
                }
                StepStatus::Succeeded => {}
            }
            outcomes.push(outcome);
        }

        let mut status = match &abort {
            Some((_, status)) => *status,
            None if warnings => InvocationStatus::SuccessWithWarnings,
            None => InvocationStatus::Success,
        };
        if ctx.is_expired() && outcomes.iter().any(|o| !o.status.is_success()) {
            status = InvocationStatus::Timeout;
        }
        let reason = match &abort {
            Some((id, failed)) => Some(format!("required step '{}' failed ({})", id, failed)),
            None if status == InvocationStatus::Timeout => {
                Some("command deadline exceeded".to_string())
            }
            None => None,
        };

        let report = CommandReport {
            command: command.name.clone(),
            call_id: ctx.call_id(),
            status,
            reason,
            findings: aggregator.finish(),
            steps: outcomes,
            failed_steps,
            results,
            elapsed: started.elapsed(),
        };

        info!(
            call_id = %report.call_id,
            command = %report.command,
            status = %report.status,
            steps = report.steps.len(),
            failed = report.failed_steps.len(),
            findings = report.findings.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Command finished"
        );
        report
    }

    async fn run_step(
        &self,
        index: usize,
        command: &ComponentDescriptor,
        step: &WorkflowStep,
        step_ctx: InvocationContext,
        prompt: String,
        params: &BoundParams,
    ) -> StepRun {
        let started = Instant::now();
        let mut run = StepRun {
            index,
            status: InvocationStatus::Success,
            reason: None,
            output: None,
            findings: Vec::new(),
            result: None,
            elapsed: Duration::ZERO,
        };

        match &step.action {
            StepAction::Agent(agent) => {
                match self.executor.invoke_nested(&step_ctx, agent, prompt).await {
                    NestedOutcome::Ran(result) => {
                        run.status = result.status;
                        run.reason = result.reason.clone();
                        run.output = result.output.clone();
                        run.result = Some(result);
                    }
                    NestedOutcome::Unresolved(err) => {
                        run.status = err.status();
                        run.reason = Some(err.to_string());
                    }
                }
            }
            StepAction::Task(name) => {
                let Some(task) = self.tasks.get(name) else {
                    run.status = InvocationStatus::NotFound;
                    run.reason = Some(format!("side task '{}' is not registered", name));
                    run.elapsed = started.elapsed();
                    return run;
                };
                if let Err(err) = step_ctx.checkpoint() {
                    run.status = err.status();
                    run.reason = Some(err.to_string());
                    run.elapsed = started.elapsed();
                    return run;
                }
                let input = TaskInput {
                    command: command.name.clone(),
                    step: step.id.clone(),
                    prompt,
                    params: params.clone(),
                };
                let outcome = tokio::select! {
                    biased;
                    _ = step_ctx.cancelled() => None,
                    outcome = task.run(input, step_ctx.cancel_token().clone()) => Some(outcome),
                };
                match outcome {
                    None => {
                        run.status = InvocationStatus::Timeout;
                        run.reason = Some(format!("side task '{}' did not finish in time", name));
                    }
                    Some(Ok(output)) => {
                        run.output = Some(output.summary);
                        run.findings = output
                            .findings
                            .into_iter()
                            .map(|mut f| {
                                if f.source_component.is_empty() {
                                    f.source_component = name.clone();
                                }
                                f
                            })
                            .collect();
                    }
                    Some(Err(e)) => {
                        run.status = InvocationStatus::Error;
                        run.reason = Some(e.to_string());
                    }
                }
            }
        }

        run.elapsed = started.elapsed();
        run
    }
}

/// State of a step that ran to completion. After an abort only a timeout
/// is the scoped cancellation; any other failure is the step's own.
fn settled_state(status: InvocationStatus, aborted: bool) -> StepStatus {
    if status.is_success() {
        StepStatus::Succeeded
    } else if aborted && status == InvocationStatus::Timeout {
        StepStatus::Cancelled
    } else {
        StepStatus::Failed(status)
    }
}

/// Mark unlaunched steps whose dependencies can no longer succeed.
fn skip_blocked(
    steps: &[WorkflowStep],
    index_of: &HashMap<&str, usize>,
    states: &mut [Option<StepStatus>],
    launched: &mut [bool],
) {
    loop {
        let mut changed = false;
        for (i, step) in steps.iter().enumerate() {
            if launched[i] {
                continue;
            }
            let blocked = step.depends_on.iter().any(|d| match index_of.get(d.as_str()) {
                Some(&j) => matches!(states[j], Some(s) if !s.is_success()),
                None => true,
            });
            if blocked {
                launched[i] = true;
                states[i] = Some(StepStatus::Skipped);
                changed = true;
            }
        }
        if !changed {
            return;
        }
    }
}

/// Prompt for one step: its template with placeholders filled, or the
/// command description plus bound arguments.
fn step_prompt(
    command: &ComponentDescriptor,
    step: &WorkflowStep,
    params: &BoundParams,
    outputs: &HashMap<String, String>,
) -> String {
    match &step.prompt {
        Some(template) => render_template(template, params, outputs),
        None => {
            let mut prompt = command.description.clone();
            if !params.is_empty() {
                prompt.push_str("\n\nArguments:");
                for (name, value) in params {
                    prompt.push_str(&format!("\n- {}: {}", name, render_value(value)));
                }
            }
            prompt
        }
    }
}

/// Replace `{param}` with a bound parameter and `{steps.<id>}` with an
/// earlier step's output. Unknown placeholders are left as written.
pub fn render_template(
    template: &str,
    params: &BoundParams,
    outputs: &HashMap<String, String>,
) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            rendered.push_str(&rest[open..]);
            return rendered;
        };
        let key = &after[..close];
        let value = match key.strip_prefix("steps.") {
            Some(id) => outputs.get(id).cloned(),
            None => params.get(key).map(render_value),
        };
        match value {
            Some(value) => rendered.push_str(&value),
            None => {
                rendered.push('{');
                rendered.push_str(key);
                rendered.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    rendered.push_str(rest);
    rendered
}

/// Steps grouped into waves that could run together: every step's
/// dependencies sit in earlier waves.
pub fn plan_waves(steps: &[WorkflowStep]) -> Vec<Vec<&str>> {
    let mut wave_of: HashMap<&str, usize> = HashMap::new();
    let mut remaining: Vec<&WorkflowStep> = steps.iter().collect();
    let mut waves: Vec<Vec<&str>> = Vec::new();

    while !remaining.is_empty() {
        let current = waves.len();
        let (ready, blocked): (Vec<&WorkflowStep>, Vec<&WorkflowStep>) = remaining
            .into_iter()
            .partition(|s| {
                s.depends_on
                    .iter()
                    .all(|d| wave_of.get(d.as_str()).is_some_and(|&w| w < current))
            });
        if ready.is_empty() {
            // unreachable for validated commands, which are acyclic
            waves.push(blocked.iter().map(|s| s.id.as_str()).collect());
            break;
        }
        for step in &ready {
            wave_of.insert(step.id.as_str(), current);
        }
        waves.push(ready.iter().map(|s| s.id.as_str()).collect());
        remaining = blocked;
    }
    waves
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{descriptor_from_str, DescriptorFormat};
    use crate::types::Tier;
    use serde_json::json;

    fn command(yaml: &str) -> ComponentDescriptor {
        descriptor_from_str(yaml, DescriptorFormat::Yaml, Some(Tier::Command)).unwrap()
    }

    #[test]
    fn test_render_template_params_and_steps() {
        let mut params = BoundParams::new();
        params.insert("target".to_string(), json!("src/"));
        params.insert("checks".to_string(), json!(["lint", "docs"]));
        let mut outputs = HashMap::new();
        outputs.insert("scan".to_string(), "3 issues".to_string());

        let rendered = render_template(
            "Review {target} for {checks}. Scan said: {steps.scan}. Keep {unknown} and {steps.nope}",
            &params,
            &outputs,
        );
        assert_eq!(
            rendered,
            "Review src/ for lint, docs. Scan said: 3 issues. Keep {unknown} and {steps.nope}"
        );
        assert_eq!(render_template("open { brace", &params, &outputs), "open { brace");
    }

    #[test]
    fn test_plan_waves_follow_dependencies() {
        let cmd = command(
            r#"
name: release
description: Cut a release
tools: [Task]
agents: [scanner, reviewer, writer]
steps:
  - agent: scanner
  - agent: reviewer
  - agent: writer
    depends_on: [scanner, reviewer]
"#,
        );
        let waves = plan_waves(&cmd.as_command().unwrap().steps);
        assert_eq!(waves, vec![vec!["scanner", "reviewer"], vec!["writer"]]);
    }

    #[test]
    fn test_default_prompt_lists_arguments() {
        let cmd = command(
            "name: audit\ndescription: Audit the tree\ntools: [Task]\nagents: [reviewer]\n",
        );
        let mut params = BoundParams::new();
        params.insert("target".to_string(), json!("lib"));
        let step = &cmd.as_command().unwrap().steps[0];
        let prompt = step_prompt(&cmd, step, &params, &HashMap::new());
        assert_eq!(prompt, "Audit the tree\n\nArguments:\n- target: lib");
    }

    #[test]
    fn test_only_timeouts_become_cancelled_after_abort() {
        assert_eq!(
            settled_state(InvocationStatus::Timeout, true),
            StepStatus::Cancelled
        );
        assert_eq!(
            settled_state(InvocationStatus::Error, true),
            StepStatus::Failed(InvocationStatus::Error)
        );
        assert_eq!(
            settled_state(InvocationStatus::PermissionViolation, true),
            StepStatus::Failed(InvocationStatus::PermissionViolation)
        );
        assert_eq!(
            settled_state(InvocationStatus::Timeout, false),
            StepStatus::Failed(InvocationStatus::Timeout)
        );
        assert_eq!(
            settled_state(InvocationStatus::SuccessWithWarnings, true),
            StepStatus::Succeeded
        );
    }

    #[test]
    fn test_skip_blocked_propagates_transitively() {
        let cmd = command(
            r#"
name: chain
description: d
tools: [Task]
agents: [a, b, c]
steps:
  - agent: a
    policy: best-effort
  - agent: b
    depends_on: [a]
  - agent: c
    depends_on: [b]
"#,
        );
        let steps = &cmd.as_command().unwrap().steps;
        let index_of: HashMap<&str, usize> =
            steps.iter().enumerate().map(|(i, s)| (s.id.as_str(), i)).collect();
        let mut states = vec![Some(StepStatus::Failed(InvocationStatus::Timeout)), None, None];
        let mut launched = vec![true, false, false];
        skip_blocked(steps, &index_of, &mut states, &mut launched);
        assert_eq!(states[1], Some(StepStatus::Skipped));
        assert_eq!(states[2], Some(StepStatus::Skipped));
    }
}
