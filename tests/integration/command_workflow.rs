use crate::integration::support::{ScriptedModel, Workspace};
use async_trait::async_trait;
use skillgraph::descriptor::FailurePolicy;
use skillgraph::error::RuntimeError;
use skillgraph::model::{SideTask, TaskInput, TaskOutput};
use skillgraph::report::{Finding, InvocationStatus, Severity};
use skillgraph::runtime::Outcome;
use skillgraph::scheduler::StepStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const REVIEW: &str = "\
name: review
description: Review the change
tools: [Task]
agents: [stylist, security]
parameters:
  target:
    type: string
    required: true
steps:
  - id: style
    agent: stylist
    policy: best-effort
  - id: security
    agent: security
    policy: best-effort
    prompt: Check {target} for secrets
";

fn review_workspace() -> Workspace {
    let ws = Workspace::new();
    ws.agent("stylist.yaml", "name: stylist\ndescription: d\ntools: [Read]\ntimeout: 50ms\n")
        .agent("security.yaml", "name: security\ndescription: d\ntools: [Read, Grep]\n")
        .command("review.yaml", REVIEW);
    ws
}

#[tokio::test(start_paused = true)]
async fn best_effort_timeout_yields_warning_and_keeps_other_findings() {
    let ws = review_workspace();
    let model = ScriptedModel::new()
        .delay("stylist", Duration::from_secs(5))
        .findings(
            "security",
            vec![Finding::new("", Severity::Medium, "token in config")
                .with_location("src/config.rs", Some(12))],
        );
    let runtime = ws.runtime(model);

    let outcome = runtime.execute_line("/review --target src").await.unwrap();
    let Outcome::Command(report) = outcome else {
        panic!("expected a command report");
    };

    assert_eq!(report.status, InvocationStatus::SuccessWithWarnings);
    assert_eq!(report.findings.len(), 2);
    let timeouts: Vec<_> = report
        .findings
        .iter()
        .filter(|f| f.status == InvocationStatus::Timeout)
        .collect();
    let successes: Vec<_> = report
        .findings
        .iter()
        .filter(|f| f.status == InvocationStatus::Success)
        .collect();
    assert_eq!(timeouts.len(), 1);
    assert_eq!(timeouts[0].source_component, "stylist");
    assert_eq!(timeouts[0].severity, Severity::Medium);
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].message, "token in config");

    assert_eq!(report.steps[0].status, StepStatus::Failed(InvocationStatus::Timeout));
    assert_eq!(report.steps[1].status, StepStatus::Succeeded);
    assert_eq!(report.failed_steps, vec!["style".to_string()]);
    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn required_failure_cancels_in_flight_and_skips_dependents() {
    let ws = Workspace::new();
    ws.agent("slowpoke.yaml", "name: slowpoke\ndescription: d\n")
        .agent("broken.yaml", "name: broken\ndescription: d\n")
        .agent("finisher.yaml", "name: finisher\ndescription: d\n")
        .command(
            "ship.yaml",
            "name: ship\ndescription: d\ntools: [Task]\nagents: [slowpoke, broken, finisher]\nsteps:\n  - id: slow\n    agent: slowpoke\n    policy: best-effort\n  - id: gate\n    agent: broken\n  - id: after\n    agent: finisher\n    depends_on: [gate]\n",
        );
    let model = ScriptedModel::new()
        .delay("slowpoke", Duration::from_secs(30))
        .delay("broken", Duration::from_millis(10))
        .fail("broken", "boom");
    let runtime = ws.runtime(model);

    let report = runtime.run_command("ship", &[]).await.unwrap();

    assert_eq!(report.status, InvocationStatus::Error);
    assert_eq!(report.reason.as_deref(), Some("required step 'gate' failed (error)"));
    assert_eq!(report.steps[0].status, StepStatus::Cancelled);
    assert_eq!(report.steps[1].status, StepStatus::Failed(InvocationStatus::Error));
    assert_eq!(report.steps[1].policy, FailurePolicy::Required);
    assert_eq!(report.steps[2].status, StepStatus::Skipped);
    assert_eq!(report.failed_steps, vec!["gate".to_string()]);

    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].severity, Severity::High);
    assert!(report.findings[0].message.starts_with("step 'gate' failed: "));
    // Cancelled well before the slow agent's own delay
    assert!(report.elapsed < Duration::from_secs(30));
    runtime.shutdown().await;
}

#[tokio::test]
async fn step_outputs_and_parameters_flow_into_prompts() {
    let ws = Workspace::new();
    ws.agent("first.yaml", "name: first\ndescription: d\n")
        .agent("second.yaml", "name: second\ndescription: d\n")
        .command(
            "chain.yaml",
            "name: chain\ndescription: Chain two agents\ntools: [Task]\nagents: [first, second]\nparameters:\n  target:\n    type: string\n    default: src\nsteps:\n  - id: one\n    agent: first\n  - id: two\n    agent: second\n    depends_on: [one]\n    prompt: \"Given {steps.one}, look at {target} and {unknown}\"\n",
        );
    let model = Arc::new(ScriptedModel::new());
    let runtime = ws.runtime_with(Arc::clone(&model), Default::default());

    let report = runtime.run_command("chain", &[]).await.unwrap();
    assert_eq!(report.status, InvocationStatus::Success);
    assert_eq!(
        model.prompts_for("second"),
        vec!["Given first done, look at src and {unknown}".to_string()]
    );
    assert_eq!(
        model.prompts_for("first"),
        vec!["Chain two agents\n\nArguments:\n- target: src".to_string()]
    );
    runtime.shutdown().await;
}

struct Collect;

#[async_trait]
impl SideTask for Collect {
    async fn run(
        &self,
        input: TaskInput,
        _cancel: CancellationToken,
    ) -> Result<TaskOutput, RuntimeError> {
        Ok(TaskOutput {
            summary: format!("collected for {}", input.command),
            findings: vec![Finding::new("", Severity::Info, "3 files changed")],
        })
    }
}

#[tokio::test]
async fn side_tasks_run_as_steps_and_missing_ones_are_not_found() {
    let ws = Workspace::new();
    ws.agent("reporter.yaml", "name: reporter\ndescription: d\n").command(
        "gather.yaml",
        "name: gather\ndescription: d\ntools: [Task]\nagents: [reporter]\nsteps:\n  - id: collect\n    task: collect\n  - id: extra\n    task: extra\n    policy: best-effort\n  - id: report\n    agent: reporter\n    depends_on: [collect]\n    prompt: \"{steps.collect}\"\n",
    );
    let runtime = ws.runtime(ScriptedModel::new());
    runtime.register_task("collect", Arc::new(Collect));

    let report = runtime.run_command("gather", &[]).await.unwrap();
    assert_eq!(report.status, InvocationStatus::SuccessWithWarnings);
    assert_eq!(report.steps[0].output.as_deref(), Some("collected for gather"));
    assert_eq!(report.steps[1].status, StepStatus::Failed(InvocationStatus::NotFound));
    assert_eq!(report.steps[2].status, StepStatus::Succeeded);

    let sources: Vec<&str> = report.findings.iter().map(|f| f.source_component.as_str()).collect();
    assert!(sources.contains(&"collect"));
    assert!(sources.contains(&"extra"));
    runtime.shutdown().await;
}

#[tokio::test]
async fn missing_required_argument_is_refused() {
    let ws = review_workspace();
    let runtime = ws.runtime(ScriptedModel::new());
    let err = runtime.execute_line("/review").await.unwrap_err();
    assert!(err.to_string().contains("target"), "{}", err);
    runtime.shutdown().await;
}
