use crate::integration::support::Workspace;
use skillgraph::tooling::cli::{CliContext, Commands};

fn context(ws: &Workspace) -> CliContext {
    CliContext::new(ws.root().to_path_buf(), None).unwrap()
}

fn workspace() -> Workspace {
    let ws = Workspace::new();
    ws.skill("lint.yaml", "name: lint\ndescription: Lint files\nfile_patterns: [\"**/*.rs\"]\n")
        .agent("reviewer.yaml", "name: reviewer\ndescription: Reviews code\ntools: [Read, Task]\n")
        .command(
            "audit.yaml",
            "name: audit\ndescription: Audit\ntools: [Task]\nagents: [reviewer]\nparameters:\n  target:\n    type: string\n    default: src\n",
        );
    ws
}

#[test]
fn validate_json_contract_has_required_fields() {
    let ws = workspace();
    let output = context(&ws)
        .execute(&Commands::Validate {
            format: "json".to_string(),
        })
        .unwrap();

    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert!(parsed.get("version").and_then(|v| v.as_u64()).is_some());
    assert_eq!(parsed.get("loaded").and_then(|v| v.as_u64()), Some(3));
    assert!(parsed.get("errors").and_then(|v| v.as_array()).is_some());
    assert!(parsed.get("warnings").and_then(|v| v.as_array()).is_some());
}

#[test]
fn list_json_filters_by_tier() {
    let ws = workspace();
    let output = context(&ws)
        .execute(&Commands::List {
            tier: Some("agent".to_string()),
            format: "json".to_string(),
        })
        .unwrap();

    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    let items = parsed.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "reviewer");
    assert_eq!(items[0]["kind"]["tier"], "agent");
}

#[test]
fn list_rejects_unknown_tier() {
    let ws = workspace();
    let err = context(&ws)
        .execute(&Commands::List {
            tier: Some("plugin".to_string()),
            format: "text".to_string(),
        })
        .unwrap_err();
    assert!(err.to_string().contains("unknown tier"));
}

#[test]
fn match_json_lists_skill_names() {
    let ws = workspace();
    let output = context(&ws)
        .execute(&Commands::Match {
            file: Some(ws.root().join("src/lib.rs")),
            text: None,
            commit: Vec::new(),
            message: None,
            run: false,
            format: "json".to_string(),
        })
        .unwrap();
    let names: Vec<String> = serde_json::from_str(&output).unwrap();
    assert_eq!(names, vec!["lint".to_string()]);
}

#[test]
fn plan_json_contract_has_waves_and_params() {
    let ws = workspace();
    let output = context(&ws)
        .execute(&Commands::Plan {
            format: "json".to_string(),
            line: vec!["/audit".to_string()],
        })
        .unwrap();

    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(parsed["component"], "audit");
    assert_eq!(parsed["tier"], "command");
    assert_eq!(parsed["params"]["target"], "src");
    assert_eq!(parsed["waves"][0][0]["id"], "reviewer");
}

#[test]
fn run_json_reports_command_outcome() {
    let ws = workspace();
    let output = context(&ws)
        .execute(&Commands::Run {
            format: "json".to_string(),
            line: vec!["/audit".to_string(), "--target".to_string(), "lib".to_string()],
        })
        .unwrap();

    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(parsed["kind"], "command");
    assert_eq!(parsed["status"], "success");
    assert_eq!(parsed["steps"][0]["status"]["state"], "succeeded");
}

#[test]
fn run_text_for_agent_line() {
    let ws = workspace();
    let output = context(&ws)
        .execute(&Commands::Run {
            format: "text".to_string(),
            line: vec!["@reviewer".to_string(), "check".to_string(), "this".to_string()],
        })
        .unwrap();
    assert!(output.contains("reviewer"));
    assert!(output.contains("success"));
}
