use crate::integration::support::{tool, ScriptedModel, Workspace};
use async_trait::async_trait;
use skillgraph::error::RuntimeError;
use skillgraph::model::{ModelClient, ToolCall, ToolHost};
use skillgraph::report::{Finding, InvocationStatus, Severity};
use skillgraph::runtime::Runtime;
use skillgraph::scheduler::StepStatus;
use skillgraph::trigger::TriggerEvent;
use std::sync::Arc;
use std::time::Duration;

/// Tool host whose calls never complete.
struct HangingToolHost;

#[async_trait]
impl ToolHost for HangingToolHost {
    async fn execute(&self, _component: &str, _call: &ToolCall) -> Result<String, RuntimeError> {
        std::future::pending().await
    }
}

fn workspace() -> Workspace {
    let ws = Workspace::new();
    ws.agent("sleeper.yaml", "name: sleeper\ndescription: d\ntools: [Read]\n")
        .agent("quick.yaml", "name: quick\ndescription: d\n")
        .command(
            "nightly.yaml",
            "name: nightly\ndescription: d\ntools: [Task]\nagents: [sleeper]\ntimeout: 100ms\n",
        );
    ws
}

#[tokio::test(start_paused = true)]
async fn zero_deadline_times_out_before_the_model_is_asked() {
    let ws = workspace();
    let mut config = ws.config();
    config.timeouts.agent_secs = 0;
    let (registry, _) = ws.registry();
    let model = Arc::new(ScriptedModel::new());
    let client: Arc<dyn ModelClient> = model.clone();
    let runtime = Runtime::new(registry, client, Arc::new(HangingToolHost), config);

    let result = runtime.call_agent("quick", "hi").await.unwrap();
    assert_eq!(result.status, InvocationStatus::Timeout);
    assert!(model.prompts_for("quick").is_empty());
    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn command_deadline_bounds_its_steps() {
    let ws = workspace();
    let model = ScriptedModel::new().delay("sleeper", Duration::from_secs(60));
    let runtime = ws.runtime(model);

    let report = runtime.run_command("nightly", &[]).await.unwrap();
    assert_eq!(report.status, InvocationStatus::Timeout);
    assert_eq!(report.steps[0].status, StepStatus::Failed(InvocationStatus::Timeout));
    assert!(report.elapsed <= Duration::from_millis(200));
    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn backstop_fires_when_a_tool_never_returns() {
    let ws = workspace();
    let (registry, _) = ws.registry();
    let mut config = ws.config();
    config.timeouts.agent_secs = 1;
    let model = ScriptedModel::new().turns("sleeper", vec![tool("Read")]);
    let runtime = Runtime::new(registry, Arc::new(model), Arc::new(HangingToolHost), config);

    let result = runtime.call_agent("sleeper", "read it").await.unwrap();
    assert_eq!(result.status, InvocationStatus::Timeout);
    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn cancel_all_stops_in_flight_calls_only() {
    let ws = workspace();
    let model = ScriptedModel::new().delay("sleeper", Duration::from_secs(60));
    let runtime = Arc::new(ws.runtime(model));

    let in_flight = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.call_agent("sleeper", "wait").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    runtime.cancel_all();

    let cancelled = in_flight.await.unwrap().unwrap();
    assert_eq!(cancelled.status, InvocationStatus::Timeout);

    let later = runtime.call_agent("quick", "hello").await.unwrap();
    assert_eq!(later.status, InvocationStatus::Success);
    runtime.shutdown().await;
}

#[tokio::test]
async fn events_after_shutdown_are_refused() {
    let ws = Workspace::new();
    ws.skill("docs.yaml", "name: docs\ndescription: d\ntrigger_keywords: [docs]\n");
    let runtime = ws.runtime(ScriptedModel::new());
    runtime.shutdown().await;

    let err = runtime
        .on_event(TriggerEvent::ConversationText {
            text: "update docs".to_string(),
        })
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RuntimeError::ShutDown));
}

#[tokio::test(start_paused = true)]
async fn zero_command_deadline_times_out_every_nested_call() {
    let ws = Workspace::new();
    ws.agent("a.yaml", "name: a\ndescription: d\n")
        .agent("b.yaml", "name: b\ndescription: d\n")
        .command(
            "now.yaml",
            "name: now\ndescription: d\ntools: [Task]\nagents: [a, b]\ntimeout: 0\n",
        );
    let model = Arc::new(ScriptedModel::new());
    let runtime = ws.runtime_with(Arc::clone(&model), Default::default());

    let report = runtime.run_command("now", &[]).await.unwrap();
    assert_eq!(report.status, InvocationStatus::Timeout);
    assert_eq!(report.results.len(), 2);
    assert!(report.results.iter().all(|r| r.status == InvocationStatus::Timeout));
    assert!(model.prompts_for("a").is_empty());
    assert!(model.prompts_for("b").is_empty());
    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn finished_steps_survive_a_command_deadline() {
    let ws = Workspace::new();
    ws.agent("fast.yaml", "name: fast\ndescription: d\n")
        .agent("stuck.yaml", "name: stuck\ndescription: d\ntools: [Read]\n")
        .command(
            "cmd.yaml",
            "name: cmd\ndescription: d\ntools: [Task]\nagents: [fast, stuck]\ntimeout: 1s\nsteps:\n  - id: a\n    agent: fast\n  - id: b\n    agent: stuck\n    depends_on: [a]\n",
        );
    let (registry, report) = ws.registry();
    assert!(report.is_clean(), "descriptor errors: {:?}", report.errors);
    let model = ScriptedModel::new()
        .findings("fast", vec![Finding::new("", Severity::High, "unchecked input")])
        .turns("stuck", vec![tool("Read")]);
    let runtime = Runtime::new(registry, Arc::new(model), Arc::new(HangingToolHost), ws.config());

    let report = runtime.run_command("cmd", &[]).await.unwrap();
    assert_eq!(report.status, InvocationStatus::Timeout);
    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.steps[0].status, StepStatus::Succeeded);
    assert_eq!(report.steps[0].output.as_deref(), Some("fast done"));
    assert_eq!(
        report.steps[1].status,
        StepStatus::Failed(InvocationStatus::Timeout)
    );
    assert_eq!(report.failed_steps, vec!["b".to_string()]);
    assert!(report
        .findings
        .iter()
        .any(|f| f.source_component == "fast" && f.message == "unchecked input"));
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].component, "fast");
    assert!(report.elapsed < Duration::from_secs(2));
    runtime.shutdown().await;
}
