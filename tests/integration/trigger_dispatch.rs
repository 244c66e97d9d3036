use crate::integration::support::{tool, RecordingToolHost, ScriptedModel, Workspace};
use skillgraph::report::{Finding, InvocationStatus, Severity};
use skillgraph::trigger::TriggerEvent;
use std::sync::Arc;

fn workspace() -> Workspace {
    let ws = Workspace::new();
    ws.skill(
        "rust-lint.yaml",
        "name: rust-lint\ndescription: d\ntools: [Read]\nfile_patterns: [\"src/**/*.rs\"]\nexclude_patterns: [\"**/*_test.rs\"]\n",
    )
    .skill(
        "security.yaml",
        "name: security\ndescription: d\npriority: high\ntools: [Read, Grep]\nfile_patterns: [\"**/*.rs\"]\ntrigger_keywords: [password]\n",
    )
    .skill(
        "docs.yaml",
        "name: docs\ndescription: d\npriority: low\ntrigger_keywords: [readme, docs]\n",
    );
    ws
}

#[tokio::test]
async fn saved_file_dispatches_matching_skills_in_priority_order() {
    let ws = workspace();
    let model = ScriptedModel::new().findings(
        "security",
        vec![Finding::new("", Severity::High, "hard-coded secret")
            .with_location("src/lib.rs", Some(3))],
    );
    let runtime = ws.runtime(model);

    let pending = runtime
        .on_event(TriggerEvent::FileSaved {
            path: ws.root().join("src/lib.rs"),
        })
        .await
        .unwrap();
    assert_eq!(pending.matched(), vec!["security", "rust-lint"]);

    let report = pending.wait().await;
    assert_eq!(report.results.len(), 2);
    assert!(report.results.iter().all(|r| r.status == InvocationStatus::Success));
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].source_component, "security");
    runtime.shutdown().await;
}

#[tokio::test]
async fn excluded_paths_do_not_dispatch() {
    let ws = workspace();
    let runtime = ws.runtime(ScriptedModel::new());

    let pending = runtime
        .on_event(TriggerEvent::FileSaved {
            path: ws.root().join("src/parser_test.rs"),
        })
        .await
        .unwrap();
    assert_eq!(pending.matched(), vec!["security"]);
    pending.wait().await;
    runtime.shutdown().await;
}

#[tokio::test]
async fn conversation_keywords_are_case_insensitive() {
    let ws = workspace();
    let runtime = ws.runtime(ScriptedModel::new());

    let pending = runtime
        .on_event(TriggerEvent::ConversationText {
            text: "Please update the README".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(pending.matched(), vec!["docs"]);
    pending.wait().await;
    runtime.shutdown().await;
}

#[tokio::test]
async fn skill_using_a_tool_outside_its_allow_list_is_stopped() {
    let ws = workspace();
    let tools = Arc::new(RecordingToolHost::default());
    let model = ScriptedModel::new().turns("rust-lint", vec![tool("Read"), tool("Write")]);
    let runtime = ws.runtime_with(Arc::new(model), Arc::clone(&tools));

    let pending = runtime
        .on_event(TriggerEvent::FileSaved {
            path: ws.root().join("src/main.rs"),
        })
        .await
        .unwrap();
    let report = pending.wait().await;

    let lint = report.results.iter().find(|r| r.component == "rust-lint").unwrap();
    assert_eq!(lint.status, InvocationStatus::PermissionViolation);
    // The permitted read happened; the write never reached the host
    assert_eq!(tools.calls(), vec![("rust-lint".to_string(), "read".to_string())]);
    assert_eq!(runtime.stats().sandbox_violations, 1);
    runtime.shutdown().await;
}

#[tokio::test]
async fn commit_matches_on_paths_and_message() {
    let ws = workspace();
    let runtime = ws.runtime(ScriptedModel::new());

    let pending = runtime
        .on_event(TriggerEvent::Commit {
            paths: vec![ws.root().join("notes.txt")],
            message: "docs: refresh guide".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(pending.matched(), vec!["docs"]);
    let report = pending.wait().await;
    assert_eq!(report.results[0].status, InvocationStatus::Success);
    runtime.shutdown().await;
}
