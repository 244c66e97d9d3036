use crate::integration::support::{invoke, RecordingToolHost, ScriptedModel, Workspace};
use skillgraph::error::DispatchError;
use skillgraph::report::InvocationStatus;
use skillgraph::runtime::Runtime;
use std::sync::Arc;

fn workspace() -> Workspace {
    let ws = Workspace::new();
    ws.skill("lint.yaml", "name: lint\ndescription: d\ntools: [Read]\ntrigger_keywords: [lint]\n")
        .agent("reviewer.yaml", "name: reviewer\ndescription: d\ntools: [Read, Task]\n")
        .agent("planner.yaml", "name: planner\ndescription: d\ntools: [Read, Task]\n")
        .agent("silent.yaml", "name: silent\ndescription: d\ntools: [Read]\n")
        .agent("retired.yaml", "name: retired\ndescription: d\nenabled: false\n")
        .command(
            "audit.yaml",
            "name: audit\ndescription: d\ntools: [Task]\nagents: [reviewer]\n",
        );
    ws
}

#[tokio::test]
async fn agent_reaches_skill_through_nested_call() {
    let ws = workspace();
    let model = ScriptedModel::new().turns("reviewer", vec![invoke("lint", "check src/")]);
    let runtime = ws.runtime(model);

    let result = runtime.call_agent("reviewer", "review").await.unwrap();
    assert_eq!(result.status, InvocationStatus::Success);
    assert_eq!(result.children.len(), 1);
    assert_eq!(result.children[0].component, "lint");
    assert_eq!(result.children[0].status, InvocationStatus::Success);
    assert_eq!(result.invocation_count(), 2);
    runtime.shutdown().await;
}

#[tokio::test]
async fn agent_to_agent_is_a_tier_violation_but_caller_continues() {
    let ws = workspace();
    let model = ScriptedModel::new().turns(
        "reviewer",
        vec![invoke("planner", "plan it"), invoke("lint", "then lint")],
    );
    let runtime = ws.runtime(model);

    let result = runtime.call_agent("reviewer", "review").await.unwrap();
    assert_eq!(result.status, InvocationStatus::Success);
    assert_eq!(result.children.len(), 2);
    assert_eq!(result.children[0].component, "planner");
    assert_eq!(result.children[0].status, InvocationStatus::PermissionViolation);
    assert_eq!(result.children[1].status, InvocationStatus::Success);
    runtime.shutdown().await;
}

#[tokio::test]
async fn self_invocation_is_a_cycle() {
    let ws = workspace();
    let model = ScriptedModel::new().turns("reviewer", vec![invoke("reviewer", "again")]);
    let runtime = ws.runtime(model);

    let result = runtime.call_agent("reviewer", "review").await.unwrap();
    assert_eq!(result.children[0].status, InvocationStatus::CycleDetected);
    runtime.shutdown().await;
}

#[tokio::test]
async fn agent_without_invoke_capability_is_stopped() {
    let ws = workspace();
    let model = ScriptedModel::new().turns("silent", vec![invoke("lint", "check")]);
    let runtime = ws.runtime(model);

    let result = runtime.call_agent("silent", "go").await.unwrap();
    assert_eq!(result.status, InvocationStatus::PermissionViolation);
    assert!(result.children.is_empty());
    runtime.shutdown().await;
}

#[tokio::test]
async fn unresolved_targets_become_findings() {
    let ws = workspace();
    let model = ScriptedModel::new().turns("reviewer", vec![invoke("ghost", "boo")]);
    let runtime = ws.runtime(model);

    let result = runtime.call_agent("reviewer", "review").await.unwrap();
    assert_eq!(result.status, InvocationStatus::Success);
    assert!(result.children.is_empty());
    assert!(result.findings.iter().any(|f| f.status == InvocationStatus::NotFound));
    runtime.shutdown().await;
}

#[tokio::test]
async fn entry_points_refuse_unknown_disabled_and_wrong_tier() {
    let ws = workspace();
    let runtime = ws.runtime(ScriptedModel::new());

    assert!(matches!(
        runtime.call_agent("retired", "hi").await,
        Err(DispatchError::Disabled { .. })
    ));
    assert!(matches!(
        runtime.call_agent("lint", "hi").await,
        Err(DispatchError::NotFound { .. })
    ));
    assert!(matches!(
        runtime.run_command("reviewer", &[]).await,
        Err(DispatchError::NotFound { .. })
    ));
    runtime.shutdown().await;
}

#[tokio::test]
async fn depth_limit_stops_the_deepest_call() {
    let ws = workspace();
    let mut config = ws.config();
    config.scheduler.max_depth = 1;
    let (registry, _) = ws.registry();
    let model = ScriptedModel::new().turns("reviewer", vec![invoke("lint", "check")]);
    let runtime = Runtime::new(
        registry,
        Arc::new(model),
        Arc::new(RecordingToolHost::default()),
        config,
    );

    let report = runtime.run_command("audit", &[]).await.unwrap();
    assert_eq!(report.status, InvocationStatus::Success);
    let reviewer = &report.results[0];
    assert_eq!(reviewer.children.len(), 1);
    assert_eq!(reviewer.children[0].status, InvocationStatus::PermissionViolation);
    assert!(reviewer.children[0]
        .reason
        .as_deref()
        .is_some_and(|r| r.contains("depth")));
    runtime.shutdown().await;
}

#[tokio::test]
async fn skill_cannot_reach_back_up_to_an_agent_from_a_command() {
    let ws = Workspace::new();
    ws.skill("lint.yaml", "name: lint\ndescription: d\ntools: [Read]\ntrigger_keywords: [lint]\n")
        .agent("reviewer.yaml", "name: reviewer\ndescription: d\ntools: [Read, Task]\n")
        .agent("helper.yaml", "name: helper\ndescription: d\ntools: [Read]\n")
        .command(
            "audit.yaml",
            "name: audit\ndescription: d\ntools: [Task]\nagents: [reviewer]\n",
        );
    let model = Arc::new(
        ScriptedModel::new()
            .turns("reviewer", vec![invoke("lint", "lint src/")])
            .turns("lint", vec![invoke("helper", "help me")]),
    );
    let runtime = ws.runtime_with(Arc::clone(&model), Default::default());

    let report = runtime.run_command("audit", &[]).await.unwrap();
    assert!(report.status.is_success());
    assert_eq!(report.results.len(), 1);

    let reviewer = &report.results[0];
    assert_eq!(reviewer.component, "reviewer");
    assert_eq!(reviewer.children.len(), 1);
    let lint = &reviewer.children[0];
    assert_eq!(lint.component, "lint");
    // a skill may not issue nested calls; it stops there and the helper never runs
    assert_eq!(lint.status, InvocationStatus::PermissionViolation);
    assert!(lint.children.is_empty());
    assert!(lint.output.is_none());
    assert!(model.prompts_for("helper").is_empty());

    assert_eq!(reviewer.status, InvocationStatus::Success);
    assert_eq!(reviewer.output.as_deref(), Some("reviewer done"));
    assert_eq!(report.invocation_count(), 2);
    runtime.shutdown().await;
}
