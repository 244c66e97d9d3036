//! Validated component descriptors: one tagged variant per tier.

use super::params::ParameterSchema;
use crate::types::{Capability, Priority, Tier};
use globset::GlobSet;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A validated Skill, Agent, or Command.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentDescriptor {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    /// Declared tool allow-list, normalised to capability names
    pub tools: BTreeSet<Capability>,
    /// Opaque identifier passed to the model collaborator
    pub model: String,
    /// Instruction text forwarded to the model collaborator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub source: PathBuf,
    /// Position in the snapshot's load order
    pub registration: usize,
    pub kind: ComponentKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "tier", rename_all = "lowercase")]
pub enum ComponentKind {
    Skill(SkillSpec),
    Agent(AgentSpec),
    Command(CommandSpec),
}

impl ComponentDescriptor {
    pub fn tier(&self) -> Tier {
        match self.kind {
            ComponentKind::Skill(_) => Tier::Skill,
            ComponentKind::Agent(_) => Tier::Agent,
            ComponentKind::Command(_) => Tier::Command,
        }
    }

    pub fn allows(&self, capability: &Capability) -> bool {
        self.tools.contains(capability)
    }

    pub fn as_skill(&self) -> Option<&SkillSpec> {
        match &self.kind {
            ComponentKind::Skill(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn as_agent(&self) -> Option<&AgentSpec> {
        match &self.kind {
            ComponentKind::Agent(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn as_command(&self) -> Option<&CommandSpec> {
        match &self.kind {
            ComponentKind::Command(spec) => Some(spec),
            _ => None,
        }
    }

    /// Explicitly declared timeout, if any
    pub fn declared_timeout(&self) -> Option<Duration> {
        match &self.kind {
            ComponentKind::Skill(spec) => spec.timeout,
            ComponentKind::Agent(spec) => spec.timeout,
            ComponentKind::Command(spec) => spec.timeout,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkillSpec {
    pub priority: Priority,
    /// Lower-cased trigger keywords
    pub trigger_keywords: Vec<String>,
    pub file_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Declared registration order; load position when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(skip)]
    pub(crate) include: Option<GlobSet>,
    #[serde(skip)]
    pub(crate) exclude: Option<GlobSet>,
}

impl SkillSpec {
    /// Include must match and no exclude may match. Patterns are tried
    /// against the full path and the bare file name.
    pub fn matches_path(&self, path: &Path) -> bool {
        let Some(include) = &self.include else {
            return false;
        };
        let file_name = path.file_name().map(Path::new);
        let hit = |set: &GlobSet| set.is_match(path) || file_name.is_some_and(|n| set.is_match(n));

        if !hit(include) {
            return false;
        }
        !self.exclude.as_ref().is_some_and(hit)
    }

    /// Case-insensitive substring match of any keyword. `text` must already
    /// be lower-cased.
    pub fn matches_text(&self, lowered: &str) -> bool {
        self.trigger_keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentSpec {
    /// Free-form capability tags
    pub capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    pub parameters: ParameterSchema,
    /// Agents this command may call, in declared order
    pub agents: Vec<String>,
    /// Workflow steps; defaults to one required step per agent
    pub steps: Vec<WorkflowStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn may_invoke(&self, agent: &str) -> bool {
        self.agents.iter().any(|a| a == agent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowStep {
    pub id: String,
    pub action: StepAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub depends_on: Vec<String>,
    pub policy: FailurePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    /// Call one Agent
    Agent(String),
    /// Run a caller-declared side task registered on the runtime
    Task(String),
}

impl StepAction {
    pub fn target(&self) -> &str {
        match self {
            StepAction::Agent(name) | StepAction::Task(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort remaining steps and propagate the failure
    Required,
    /// Record the failure as a finding and continue
    BestEffort,
}

impl FailurePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "required" => Some(FailurePolicy::Required),
            "best-effort" | "best_effort" | "besteffort" => Some(FailurePolicy::BestEffort),
            _ => None,
        }
    }
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Required
    }
}
