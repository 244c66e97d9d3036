//! Descriptor validation: turns a `RawDescriptor` into a tier-tagged
//! `ComponentDescriptor`, collecting every problem instead of stopping at the
//! first one.

use super::component::{
    AgentSpec, CommandSpec, ComponentDescriptor, ComponentKind, FailurePolicy, SkillSpec,
    StepAction, WorkflowStep,
};
use super::params::{ParamType, ParameterSchema, ParameterSpec};
use super::raw::{RawDescriptor, RawStep, TimeoutValue};
use crate::config::ToggleConfig;
use crate::types::{Capability, Priority, Tier};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::time::Duration;

/// Model identifier used when neither the descriptor nor the toggles name one
pub const FALLBACK_MODEL: &str = "default";

/// Inputs the validator needs beyond the raw record itself.
pub struct ValidationContext<'a> {
    pub path: &'a Path,
    /// Tier implied by the descriptor's directory, if any
    pub inferred_tier: Option<Tier>,
    pub toggles: &'a ToggleConfig,
}

/// A descriptor that passed validation, plus non-fatal remarks.
#[derive(Debug)]
pub struct Validated {
    pub descriptor: ComponentDescriptor,
    pub warnings: Vec<String>,
}

/// Default allow-list for a tier when `tools` is omitted.
pub fn default_tools(tier: Tier) -> BTreeSet<Capability> {
    let names: &[&str] = match tier {
        Tier::Skill => &[Capability::READ, Capability::SEARCH],
        Tier::Agent => &[
            Capability::READ,
            Capability::WRITE,
            Capability::EDIT,
            Capability::SEARCH,
            Capability::INVOKE_COMPONENT,
        ],
        Tier::Command => &[
            Capability::READ,
            Capability::SEARCH,
            Capability::INVOKE_COMPONENT,
        ],
    };
    names.iter().map(|n| Capability::new(n)).collect()
}

/// Validate one raw descriptor.
pub fn validate_descriptor(
    raw: RawDescriptor,
    ctx: &ValidationContext<'_>,
) -> Result<Validated, Vec<String>> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let tier = match raw.tier.as_deref() {
        Some(declared) => match Tier::parse(declared) {
            Some(tier) => Some(tier),
            None => {
                errors.push(format!(
                    "unknown tier '{}' (expected skill, agent, or command)",
                    declared
                ));
                None
            }
        },
        None => {
            if ctx.inferred_tier.is_none() {
                errors.push(
                    "missing tier: declare `tier` or place the file under skills/, agents/, or commands/"
                        .to_string(),
                );
            }
            ctx.inferred_tier
        }
    };

    let name = raw
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    match &name {
        None => errors.push("name cannot be empty".to_string()),
        Some(n) if !is_valid_name(n) => errors.push(format!(
            "invalid name '{}': use letters, digits, '-', '_', '.', or ':'",
            n
        )),
        Some(_) => {}
    }

    let description = raw
        .description
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if description.is_empty() {
        errors.push("description cannot be empty".to_string());
    }

    let timeout = match &raw.timeout {
        None => None,
        Some(value) => match timeout_from(value) {
            Ok(d) => Some(d),
            Err(e) => {
                errors.push(e);
                None
            }
        },
    };

    for key in raw.extra.keys() {
        warnings.push(format!("unrecognised field '{}' ignored", key));
    }

    // Without a tier nothing else can be checked meaningfully.
    let Some(tier) = tier else {
        return Err(errors);
    };

    let tools: BTreeSet<Capability> = match &raw.tools {
        Some(list) => list.names().iter().map(|n| Capability::new(n)).collect(),
        None => default_tools(tier),
    };
    if tier == Tier::Skill {
        for capability in tools.iter().filter(|c| c.is_forbidden_for_skill()) {
            errors.push(format!(
                "skills may not declare capability '{}'",
                capability
            ));
        }
    }

    reject_foreign_fields(&raw, tier, &mut errors);

    let kind = match tier {
        Tier::Skill => {
            skill_spec(&raw, timeout, &mut errors, &mut warnings).map(ComponentKind::Skill)
        }
        Tier::Agent => agent_spec(&raw, timeout, &mut errors).map(ComponentKind::Agent),
        Tier::Command => {
            command_spec(&raw, timeout, &tools, &mut errors).map(ComponentKind::Command)
        }
    };

    let model = match raw.model.as_deref().map(str::trim) {
        Some(m) if !m.is_empty() && m != "inherit" => m.to_string(),
        _ => ctx
            .toggles
            .default_model
            .clone()
            .unwrap_or_else(|| FALLBACK_MODEL.to_string()),
    };

    let mut enabled = raw.enabled.unwrap_or(true);
    if let (Tier::Skill, Some(n)) = (tier, &name) {
        if ctx.toggles.disabled_skills.iter().any(|d| d == n) {
            enabled = false;
        }
    }

    match (name, kind) {
        (Some(name), Some(kind)) if errors.is_empty() => Ok(Validated {
            descriptor: ComponentDescriptor {
                name,
                description,
                enabled,
                tools,
                model,
                instructions: raw.instructions,
                source: ctx.path.to_path_buf(),
                registration: 0,
                kind,
            },
            warnings,
        }),
        _ => Err(errors),
    }
}

fn is_valid_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

fn reject_foreign_fields(raw: &RawDescriptor, tier: Tier, errors: &mut Vec<String>) {
    let present = |set: bool, field: &str, owner: Tier, errors: &mut Vec<String>| {
        if set && tier != owner {
            errors.push(format!(
                "field '{}' is only valid for {}s, not {}s",
                field, owner, tier
            ));
        }
    };
    present(raw.priority.is_some(), "priority", Tier::Skill, errors);
    present(raw.trigger_keywords.is_some(), "trigger_keywords", Tier::Skill, errors);
    present(raw.file_patterns.is_some(), "file_patterns", Tier::Skill, errors);
    present(raw.exclude_patterns.is_some(), "exclude_patterns", Tier::Skill, errors);
    present(raw.order.is_some(), "order", Tier::Skill, errors);
    present(raw.capabilities.is_some(), "capabilities", Tier::Agent, errors);
    present(raw.max_iterations.is_some(), "max_iterations", Tier::Agent, errors);
    present(raw.parameters.is_some(), "parameters", Tier::Command, errors);
    present(raw.agents.is_some(), "agents", Tier::Command, errors);
    present(raw.steps.is_some(), "steps", Tier::Command, errors);
}

fn skill_spec(
    raw: &RawDescriptor,
    timeout: Option<Duration>,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) -> Option<SkillSpec> {
    let priority = match raw.priority.as_deref() {
        None => Priority::default(),
        Some(p) => match Priority::parse(p) {
            Some(priority) => priority,
            None => {
                errors.push(format!(
                    "invalid priority '{}' (expected high, medium, or low)",
                    p
                ));
                return None;
            }
        },
    };

    let trigger_keywords: Vec<String> = raw
        .trigger_keywords
        .iter()
        .flatten()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    let file_patterns = raw.file_patterns.clone().unwrap_or_default();
    let exclude_patterns = raw.exclude_patterns.clone().unwrap_or_default();

    let include = compile_globs(&file_patterns, "file_patterns", errors);
    let exclude = compile_globs(&exclude_patterns, "exclude_patterns", errors);

    if trigger_keywords.is_empty() && file_patterns.is_empty() {
        warnings.push(
            "skill declares no trigger_keywords or file_patterns and will never trigger"
                .to_string(),
        );
    }

    Some(SkillSpec {
        priority,
        trigger_keywords,
        file_patterns,
        exclude_patterns,
        order: raw.order,
        timeout,
        include,
        exclude,
    })
}

fn compile_globs(patterns: &[String], field: &str, errors: &mut Vec<String>) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match GlobBuilder::new(pattern).literal_separator(false).build() {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => errors.push(format!("invalid glob in {} '{}': {}", field, pattern, e)),
        }
    }
    match builder.build() {
        Ok(set) => Some(set),
        Err(e) => {
            errors.push(format!("failed to compile {}: {}", field, e));
            None
        }
    }
}

fn agent_spec(
    raw: &RawDescriptor,
    timeout: Option<Duration>,
    errors: &mut Vec<String>,
) -> Option<AgentSpec> {
    let max_iterations = match raw.max_iterations {
        None => None,
        Some(n) if n > 0 && n <= u32::MAX as i64 => Some(n as u32),
        Some(n) => {
            errors.push(format!("max_iterations must be positive, got {}", n));
            return None;
        }
    };
    Some(AgentSpec {
        capabilities: raw.capabilities.clone().unwrap_or_default(),
        max_iterations,
        timeout,
    })
}

fn command_spec(
    raw: &RawDescriptor,
    timeout: Option<Duration>,
    tools: &BTreeSet<Capability>,
    errors: &mut Vec<String>,
) -> Option<CommandSpec> {
    let before = errors.len();

    let mut params = Vec::new();
    for (name, p) in raw.parameters.iter().flatten() {
        let Some(kind) = p.kind.as_deref().and_then(ParamType::parse) else {
            errors.push(format!(
                "parameter '{}' has missing or unknown type '{}' (expected string, array, boolean, or number)",
                name,
                p.kind.as_deref().unwrap_or("")
            ));
            continue;
        };
        if let Some(default) = &p.default {
            if !kind.accepts(default) {
                errors.push(format!(
                    "parameter '{}' default {} does not match type {}",
                    name, default, kind
                ));
            }
        }
        params.push(ParameterSpec {
            name: name.clone(),
            kind,
            description: p.description.clone(),
            required: p.required.unwrap_or(false),
            default: p.default.clone(),
        });
    }

    let agents: Vec<String> = raw
        .agents
        .iter()
        .flatten()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    if !agents.is_empty() && !tools.contains(&Capability::invoke_component()) {
        errors.push(format!(
            "command lists agents but its tools lack '{}'",
            Capability::INVOKE_COMPONENT
        ));
    }

    let steps = match &raw.steps {
        Some(raw_steps) => workflow_steps(raw_steps, &agents, errors),
        None => agents
            .iter()
            .map(|agent| WorkflowStep {
                id: agent.clone(),
                action: StepAction::Agent(agent.clone()),
                prompt: None,
                depends_on: Vec::new(),
                policy: FailurePolicy::Required,
            })
            .collect(),
    };

    if errors.len() > before {
        return None;
    }
    Some(CommandSpec {
        category: raw.category.clone(),
        usage: raw.usage.clone(),
        parameters: ParameterSchema::new(params),
        agents,
        steps,
        timeout,
    })
}

fn workflow_steps(
    raw_steps: &[RawStep],
    agents: &[String],
    errors: &mut Vec<String>,
) -> Vec<WorkflowStep> {
    let mut steps = Vec::new();
    let mut ids = HashSet::new();

    for (index, raw) in raw_steps.iter().enumerate() {
        let action = match (&raw.agent, &raw.task) {
            (Some(agent), None) => {
                if !agents.iter().any(|a| a == agent) {
                    errors.push(format!(
                        "step {} calls agent '{}' which is not listed in agents",
                        index + 1,
                        agent
                    ));
                }
                StepAction::Agent(agent.clone())
            }
            (None, Some(task)) => StepAction::Task(task.clone()),
            _ => {
                errors.push(format!(
                    "step {} must declare exactly one of 'agent' or 'task'",
                    index + 1
                ));
                continue;
            }
        };

        let id = raw
            .id
            .clone()
            .unwrap_or_else(|| action.target().to_string());
        if !ids.insert(id.clone()) {
            errors.push(format!("duplicate step id '{}'", id));
        }

        let policy = match raw.policy.as_deref() {
            None => FailurePolicy::default(),
            Some(p) => FailurePolicy::parse(p).unwrap_or_else(|| {
                errors.push(format!(
                    "step '{}' has invalid policy '{}' (expected required or best-effort)",
                    id, p
                ));
                FailurePolicy::default()
            }),
        };

        steps.push(WorkflowStep {
            id,
            action,
            prompt: raw.prompt.clone(),
            depends_on: raw.depends_on.clone(),
            policy,
        });
    }

    for step in &steps {
        for dep in &step.depends_on {
            if !ids.contains(dep) {
                errors.push(format!("step '{}' depends on unknown step '{}'", step.id, dep));
            } else if dep == &step.id {
                errors.push(format!("step '{}' depends on itself", step.id));
            }
        }
    }
    if let Some(stuck) = find_dependency_cycle(&steps) {
        errors.push(format!(
            "step dependencies form a cycle involving: {}",
            stuck.join(", ")
        ));
    }

    steps
}

/// Kahn's algorithm over step ids; returns the ids left unresolved when a cycle exists.
fn find_dependency_cycle(steps: &[WorkflowStep]) -> Option<Vec<String>> {
    let known: HashSet<&str> = steps.iter().map(|s| s.id.as_str()).collect();
    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for step in steps {
        indegree.entry(step.id.as_str()).or_insert(0);
        for dep in step.depends_on.iter().filter(|d| known.contains(d.as_str())) {
            *indegree.entry(step.id.as_str()).or_insert(0) += 1;
            dependents.entry(dep.as_str()).or_default().push(step.id.as_str());
        }
    }

    let mut queue: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut resolved = 0;
    while let Some(id) = queue.pop_front() {
        resolved += 1;
        for next in dependents.get(id).into_iter().flatten() {
            if let Some(d) = indegree.get_mut(next) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(next);
                }
            }
        }
    }

    if resolved == indegree.len() {
        return None;
    }
    let mut stuck: Vec<String> = indegree
        .into_iter()
        .filter(|(_, d)| *d > 0)
        .map(|(id, _)| id.to_string())
        .collect();
    stuck.sort();
    Some(stuck)
}

fn timeout_from(value: &TimeoutValue) -> Result<Duration, String> {
    match value {
        TimeoutValue::Seconds(secs) => Ok(Duration::from_secs(*secs)),
        TimeoutValue::Text(text) => {
            parse_duration(text).ok_or_else(|| format!("invalid timeout '{}'", text))
        }
    }
}

/// Parse `500ms`, `30s`, `5m`, `1h`, or bare seconds.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let value: u64 = digits.parse().ok()?;
    match unit.trim() {
        "" | "s" | "sec" | "secs" => Some(Duration::from_secs(value)),
        "ms" => Some(Duration::from_millis(value)),
        "m" | "min" | "mins" => Some(Duration::from_secs(value.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(value.checked_mul(3600)?)),
        _ => None,
    }
}
