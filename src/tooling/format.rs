//! Human-readable rendering of registry listings, plans and reports.

use crate::descriptor::{ComponentDescriptor, ComponentKind, FailurePolicy, StepAction};
use crate::registry::{LoadReport, Snapshot};
use crate::report::{Finding, InvocationResult, InvocationStatus};
use crate::runtime::{EventReport, Plan};
use crate::scheduler::{CommandReport, StepStatus};
use crate::types::Tier;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::Duration;

/// Format a section heading with bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

pub fn format_status(status: InvocationStatus) -> String {
    match status {
        InvocationStatus::Success => format!("{}", status.green()),
        InvocationStatus::SuccessWithWarnings | InvocationStatus::Disabled => {
            format!("{}", status.yellow())
        }
        _ => format!("{}", status.red()),
    }
}

fn format_duration(elapsed: Duration) -> String {
    if elapsed.as_secs() >= 1 {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        format!("{}ms", elapsed.as_millis())
    }
}

fn tool_list(descriptor: &ComponentDescriptor) -> String {
    descriptor
        .tools
        .iter()
        .map(|c| c.as_str().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Table of registered components, optionally restricted to one tier.
pub fn format_component_table(snapshot: &Snapshot, tier: Option<Tier>) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Tier", "Name", "Enabled", "Tools", "Description"]);

    let mut rows = 0;
    for descriptor in snapshot.iter().filter(|d| tier.map_or(true, |t| d.tier() == t)) {
        let enabled = if descriptor.enabled {
            "yes".to_string()
        } else {
            format!("{}", "no".yellow())
        };
        table.add_row(vec![
            descriptor.tier().to_string(),
            descriptor.name.clone(),
            enabled,
            tool_list(descriptor),
            descriptor.description.clone(),
        ]);
        rows += 1;
    }

    if rows == 0 {
        return "No components registered.".to_string();
    }
    format!(
        "{}\n\n{}\n\nSnapshot version {}, {} component(s)",
        format_section_heading("Components"),
        table,
        snapshot.version(),
        rows
    )
}

/// Detailed view of one descriptor.
pub fn format_descriptor_detail(descriptor: &ComponentDescriptor) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n\n",
        format_section_heading(&format!("{} {}", descriptor.tier(), descriptor.name))
    ));
    out.push_str(&format!("  Description: {}\n", descriptor.description));
    out.push_str(&format!("  Source: {}\n", descriptor.source.display()));
    out.push_str(&format!("  Enabled: {}\n", descriptor.enabled));
    out.push_str(&format!("  Model: {}\n", descriptor.model));
    out.push_str(&format!("  Tools: {}\n", tool_list(descriptor)));

    match &descriptor.kind {
        ComponentKind::Skill(spec) => {
            out.push_str(&format!("  Priority: {}\n", spec.priority));
            if !spec.trigger_keywords.is_empty() {
                out.push_str(&format!("  Keywords: {}\n", spec.trigger_keywords.join(", ")));
            }
            if !spec.file_patterns.is_empty() {
                out.push_str(&format!("  File patterns: {}\n", spec.file_patterns.join(", ")));
            }
            if !spec.exclude_patterns.is_empty() {
                out.push_str(&format!("  Excluded: {}\n", spec.exclude_patterns.join(", ")));
            }
        }
        ComponentKind::Agent(spec) => {
            if !spec.capabilities.is_empty() {
                out.push_str(&format!("  Capabilities: {}\n", spec.capabilities.join(", ")));
            }
            if let Some(n) = spec.max_iterations {
                out.push_str(&format!("  Max iterations: {}\n", n));
            }
        }
        ComponentKind::Command(spec) => {
            if let Some(usage) = &spec.usage {
                out.push_str(&format!("  Usage: {}\n", usage));
            }
            if !spec.parameters.is_empty() {
                out.push('\n');
                let mut table = Table::new();
                table.load_preset(UTF8_BORDERS_ONLY);
                table.set_header(vec!["Parameter", "Type", "Required", "Default"]);
                for param in spec.parameters.iter() {
                    table.add_row(vec![
                        param.name.clone(),
                        param.kind.to_string(),
                        param.required.to_string(),
                        param
                            .default
                            .as_ref()
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                    ]);
                }
                out.push_str(&format!("{}\n", table));
            }
            out.push('\n');
            let mut table = Table::new();
            table.load_preset(UTF8_BORDERS_ONLY);
            table.set_header(vec!["Step", "Runs", "Policy", "After"]);
            for step in &spec.steps {
                table.add_row(vec![
                    step.id.clone(),
                    step_action(&step.action),
                    policy(step.policy).to_string(),
                    step.depends_on.join(", "),
                ]);
            }
            out.push_str(&format!("{}\n", table));
        }
    }

    if let Some(timeout) = descriptor.declared_timeout() {
        out.push_str(&format!("  Timeout: {}\n", format_duration(timeout)));
    }
    out
}

fn step_action(action: &StepAction) -> String {
    match action {
        StepAction::Agent(name) => format!("@{}", name),
        StepAction::Task(name) => format!("task {}", name),
    }
}

fn policy(policy: FailurePolicy) -> &'static str {
    match policy {
        FailurePolicy::Required => "required",
        FailurePolicy::BestEffort => "best-effort",
    }
}

/// Load errors and warnings.
pub fn format_load_report(report: &LoadReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n\n",
        format_section_heading("Descriptor validation")
    ));
    out.push_str(&format!(
        "  Loaded: {} (snapshot version {})\n",
        report.loaded, report.version
    ));
    out.push_str(&format!("  Errors: {}\n", report.errors.len()));
    out.push_str(&format!("  Warnings: {}\n", report.warnings.len()));

    if !report.errors.is_empty() {
        out.push('\n');
        for error in &report.errors {
            out.push_str(&format!("  {} {}\n", "error:".red(), error));
        }
    }
    if !report.warnings.is_empty() {
        out.push('\n');
        for warning in &report.warnings {
            out.push_str(&format!("  {} {}\n", "warning:".yellow(), warning));
        }
    }
    out
}

/// Skills an event would dispatch, in dispatch order.
pub fn format_match(matched: &[Arc<ComponentDescriptor>]) -> String {
    if matched.is_empty() {
        return "No skills match.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["#", "Skill", "Priority", "Description"]);
    for (i, descriptor) in matched.iter().enumerate() {
        let priority = descriptor
            .as_skill()
            .map(|s| s.priority.to_string())
            .unwrap_or_default();
        table.add_row(vec![
            (i + 1).to_string(),
            descriptor.name.clone(),
            priority,
            descriptor.description.clone(),
        ]);
    }
    table.to_string()
}

pub fn format_plan(plan: &Plan) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n\n",
        format_section_heading(&format!("Plan: {} {}", plan.tier, plan.component))
    ));
    out.push_str(&format!("  Timeout: {}\n", format_duration(plan.timeout)));
    out.push_str(&format!("  Max depth: {}\n", plan.max_depth));
    out.push_str(&format!(
        "  Tools: {}\n",
        plan.tools.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
    ));
    if let Some(params) = &plan.params {
        for (name, value) in params {
            out.push_str(&format!("  --{} = {}\n", name, value));
        }
    }

    for (i, wave) in plan.waves.iter().enumerate() {
        out.push_str(&format!("\n  Wave {}\n", i + 1));
        for step in wave {
            let timeout = step
                .timeout
                .map(format_duration)
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "    {} {} [{}] timeout {}\n",
                step.id,
                step_action(&step.action),
                policy(step.policy),
                timeout
            ));
            if let Some(problem) = &step.problem {
                out.push_str(&format!("      {} {}\n", "problem:".red(), problem));
            }
        }
    }
    out
}

/// Findings as a table, most severe first.
pub fn format_findings(findings: &[Finding]) -> String {
    if findings.is_empty() {
        return "  No findings.\n".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Severity", "Source", "Status", "Message", "Location"]);
    for finding in findings {
        let location = finding
            .location
            .as_ref()
            .map(|l| match l.line {
                Some(line) => format!("{}:{}", l.path.display(), line),
                None => l.path.display().to_string(),
            })
            .unwrap_or_default();
        table.add_row(vec![
            finding.severity.to_string(),
            finding.source_component.clone(),
            finding.status.to_string(),
            finding.message.clone(),
            location,
        ]);
    }
    format!("{}\n", table)
}

/// Indented call tree of one result.
pub fn format_invocation_tree(result: &InvocationResult) -> String {
    let mut out = String::new();
    push_tree(&mut out, result, 1);
    out
}

fn push_tree(out: &mut String, result: &InvocationResult, depth: usize) {
    out.push_str(&format!(
        "{}{} {} {} ({})",
        "  ".repeat(depth),
        result.tier,
        result.component,
        format_status(result.status),
        format_duration(result.elapsed)
    ));
    if let Some(reason) = &result.reason {
        out.push_str(&format!(": {}", reason));
    }
    out.push('\n');
    for child in &result.children {
        push_tree(out, child, depth + 1);
    }
}

pub fn format_agent_result(result: &InvocationResult) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n\n",
        format_section_heading(&format!("@{}", result.component))
    ));
    out.push_str(&format_invocation_tree(result));
    if let Some(output) = &result.output {
        out.push_str(&format!("\n{}\n", output));
    }
    out.push('\n');
    out.push_str(&format_findings(&crate::report::aggregate(std::slice::from_ref(result))));
    out
}

pub fn format_command_report(report: &CommandReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n\n",
        format_section_heading(&format!("/{}", report.command))
    ));
    out.push_str(&format!(
        "  Status: {} in {}\n",
        format_status(report.status),
        format_duration(report.elapsed)
    ));
    if let Some(reason) = &report.reason {
        out.push_str(&format!("  Reason: {}\n", reason));
    }

    if !report.steps.is_empty() {
        out.push('\n');
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec!["Step", "Target", "Policy", "Outcome", "Elapsed", "Note"]);
        for step in &report.steps {
            let outcome = match step.status {
                StepStatus::Succeeded => format!("{}", step.status.label().green()),
                StepStatus::Skipped | StepStatus::Cancelled => {
                    format!("{}", step.status.label().yellow())
                }
                StepStatus::Failed(_) => format!("{}", step.status.label().red()),
            };
            table.add_row(vec![
                step.id.clone(),
                step.target.clone(),
                policy(step.policy).to_string(),
                outcome,
                format_duration(step.elapsed),
                step.reason.clone().unwrap_or_default(),
            ]);
        }
        out.push_str(&format!("{}\n", table));
    }

    out.push('\n');
    out.push_str(&format_findings(&report.findings));
    out
}

pub fn format_event_report(report: &EventReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n\n",
        format_section_heading(&format!("Event {}", report.event.kind()))
    ));
    if report.results.is_empty() {
        out.push_str("  No skills dispatched.\n");
        return out;
    }
    for result in &report.results {
        out.push_str(&format_invocation_tree(result));
    }
    out.push('\n');
    out.push_str(&format_findings(&report.findings));
    out
}
