use crate::integration::support::Workspace;
use skillgraph::config::sources::environment::DISABLE_SKILLS_VAR;
use skillgraph::registry::Registry;
use std::collections::HashMap;
use skillgraph::types::{Capability, Priority, Tier};

#[test]
fn loads_every_format_and_infers_tier_from_directory() {
    let ws = Workspace::new();
    ws.skill(
        "lint.md",
        "---\nname: lint\ndescription: Lint changed files\ntools: Read, Grep\nfile_patterns: [\"**/*.rs\"]\npriority: high\n---\n\nRun the linter on the saved file.\n",
    )
    .agent("reviewer.yaml", "name: reviewer\ndescription: Reviews code\ntools: [Read, Task]\nmax_iterations: 5\n")
    .command(
        "audit.toml",
        "name = \"audit\"\ndescription = \"Audit the tree\"\ntools = [\"Task\"]\nagents = [\"reviewer\"]\n",
    );

    let (registry, report) = ws.registry();
    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(report.loaded, 3);

    let snapshot = registry.snapshot();
    let lint = snapshot.get(Tier::Skill, "lint").unwrap();
    assert_eq!(lint.instructions.as_deref(), Some("Run the linter on the saved file."));
    assert!(lint.allows(&Capability::new("Grep")));
    assert_eq!(lint.as_skill().unwrap().priority, Priority::High);

    let reviewer = snapshot.get(Tier::Agent, "reviewer").unwrap();
    assert_eq!(reviewer.as_agent().unwrap().max_iterations, Some(5));

    let audit = snapshot.get(Tier::Command, "audit").unwrap();
    assert_eq!(audit.as_command().unwrap().steps.len(), 1);
}

#[test]
fn invalid_descriptors_are_reported_and_skipped() {
    let ws = Workspace::new();
    ws.skill("ok.yaml", "name: ok\ndescription: fine\ntrigger_keywords: [ok]\n")
        .skill("shell.yaml", "name: shell\ndescription: d\ntools: [Bash]\n")
        .skill("broken.yaml", "name: [unterminated\n")
        .agent("nameless.yaml", "description: no name\n");

    let (registry, report) = ws.registry();
    assert_eq!(report.loaded, 1);
    assert_eq!(report.errors.len(), 3);
    assert!(registry.snapshot().get(Tier::Skill, "ok").is_some());
    assert!(registry.snapshot().get(Tier::Skill, "shell").is_none());
}

#[test]
fn reload_publishes_new_version_and_keeps_old_snapshot() {
    let ws = Workspace::new();
    ws.skill("a.yaml", "name: a\ndescription: d\ntrigger_keywords: [a]\n");
    let (registry, first) = ws.registry();
    let before = registry.snapshot();

    ws.skill("b.yaml", "name: b\ndescription: d\ntrigger_keywords: [b]\n");
    let second = registry.reload(&ws.config());

    assert!(second.version > first.version);
    assert_eq!(before.len(), 1);
    assert_eq!(registry.snapshot().len(), 2);
}

#[test]
fn same_name_in_different_tiers_is_allowed() {
    let ws = Workspace::new();
    ws.skill("review.yaml", "name: review\ndescription: d\ntrigger_keywords: [r]\n")
        .agent("review.yaml", "name: review\ndescription: d\n");

    let (registry, report) = ws.registry();
    assert!(report.is_clean(), "{:?}", report.errors);
    let snapshot = registry.snapshot();
    assert!(snapshot.get(Tier::Skill, "review").is_some());
    assert!(snapshot.get(Tier::Agent, "review").is_some());
}

#[test]
fn reload_picks_up_toggles_changed_after_load() {
    let ws = Workspace::new();
    ws.skill("lint.yaml", "name: lint\ndescription: d\ntrigger_keywords: [lint]\n")
        .skill("docs.yaml", "name: docs\ndescription: d\ntrigger_keywords: [docs]\n");
    let config = ws.config();
    let (registry, _) = Registry::load(&config);
    assert!(registry.snapshot().get(Tier::Skill, "lint").unwrap().enabled);

    let mut vars = HashMap::new();
    vars.insert(DISABLE_SKILLS_VAR.to_string(), "lint".to_string());
    let report = registry.reload_with_env(&config, Some(&vars));
    assert!(report.is_clean());

    let snapshot = registry.snapshot();
    assert!(!snapshot.get(Tier::Skill, "lint").unwrap().enabled);
    assert!(snapshot.get(Tier::Skill, "docs").unwrap().enabled);

    registry.reload_with_env(&config, Some(&HashMap::new()));
    assert!(registry.snapshot().get(Tier::Skill, "lint").unwrap().enabled);
}
