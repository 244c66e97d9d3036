//! Runtime configuration.
//!
//! Layered with the `config` crate: built-in defaults, global file, workspace
//! file, `SKILLGRAPH_*` environment, then the named toggles. See
//! [`ConfigLoader`].

pub mod facade;
pub mod merge;
pub mod paths;
pub mod sources;

pub use facade::ConfigLoader;
pub use merge::service::ConfigSources;
pub use paths::xdg_root as xdg;

use crate::descriptor::{ComponentDescriptor, ComponentKind};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-workspace directory holding descriptors and config
pub const WORKSPACE_DIR: &str = ".skillgraph";

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1024;
pub const DEFAULT_MAX_DEPTH: u32 = 2;

/// Top-level runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub toggles: ToggleConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RuntimeConfig {
    /// Defaults anchored at a workspace root.
    pub fn for_workspace(workspace_root: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.registry.workspace_root = workspace_root.into();
        config
    }
}

/// Where descriptors are loaded from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Descriptor roots, relative to the workspace root unless absolute.
    /// Empty means `<workspace>/.skillgraph/{skills,agents,commands}`.
    #[serde(default)]
    pub paths: Vec<PathBuf>,

    /// Set by the loader, never read from config files
    #[serde(skip)]
    pub workspace_root: PathBuf,
}

impl RegistryConfig {
    /// Descriptor roots in load order.
    pub fn resolved_paths(&self) -> Vec<PathBuf> {
        if self.paths.is_empty() {
            let base = self.workspace_root.join(WORKSPACE_DIR);
            return ["skills", "agents", "commands"]
                .iter()
                .map(|dir| base.join(dir))
                .collect();
        }
        self.paths
            .iter()
            .map(|p| resolve_against(&self.workspace_root, p))
            .collect()
    }
}

fn resolve_against(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Scheduler limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Skill worker pool size; also the workflow fan-out limit
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Pending skill jobs before `QueueFull`
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Nesting depth budget of a top-level call
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Extra time granted past a deadline before the backstop fires
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_max_queue_size() -> usize {
    DEFAULT_MAX_QUEUE_SIZE
}

fn default_max_depth() -> u32 {
    DEFAULT_MAX_DEPTH
}

fn default_cancel_grace_ms() -> u64 {
    250
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_queue_size: default_max_queue_size(),
            max_depth: default_max_depth(),
            cancel_grace_ms: default_cancel_grace_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

/// Default time and iteration budgets per tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_skill_secs")]
    pub skill_secs: u64,

    /// Agent budget when neither `timeout` nor `max_iterations` is declared
    #[serde(default = "default_agent_secs")]
    pub agent_secs: u64,

    /// Per-iteration budget when an Agent declares only `max_iterations`
    #[serde(default = "default_agent_iteration_secs")]
    pub agent_iteration_secs: u64,

    #[serde(default = "default_command_secs")]
    pub command_secs: u64,

    #[serde(default = "default_skill_max_iterations")]
    pub skill_max_iterations: u32,

    #[serde(default = "default_agent_max_iterations")]
    pub agent_max_iterations: u32,
}

fn default_skill_secs() -> u64 {
    10
}

fn default_agent_secs() -> u64 {
    300
}

fn default_agent_iteration_secs() -> u64 {
    12
}

fn default_command_secs() -> u64 {
    600
}

fn default_skill_max_iterations() -> u32 {
    8
}

fn default_agent_max_iterations() -> u32 {
    25
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            skill_secs: default_skill_secs(),
            agent_secs: default_agent_secs(),
            agent_iteration_secs: default_agent_iteration_secs(),
            command_secs: default_command_secs(),
            skill_max_iterations: default_skill_max_iterations(),
            agent_max_iterations: default_agent_max_iterations(),
        }
    }
}

impl TimeoutConfig {
    /// Time budget of one invocation of `descriptor`.
    ///
    /// An explicit `timeout` always wins. Agents without one get
    /// `max_iterations * agent_iteration_secs`, else `agent_secs`.
    pub fn timeout_for(&self, descriptor: &ComponentDescriptor) -> Duration {
        if let Some(timeout) = descriptor.declared_timeout() {
            return timeout;
        }
        match &descriptor.kind {
            ComponentKind::Skill(_) => Duration::from_secs(self.skill_secs),
            ComponentKind::Agent(spec) => match spec.max_iterations {
                Some(n) => Duration::from_secs(self.agent_iteration_secs.saturating_mul(n as u64)),
                None => Duration::from_secs(self.agent_secs),
            },
            ComponentKind::Command(_) => Duration::from_secs(self.command_secs),
        }
    }

    /// Model-turn budget of one invocation of `descriptor`.
    pub fn iterations_for(&self, descriptor: &ComponentDescriptor) -> u32 {
        match &descriptor.kind {
            ComponentKind::Skill(_) => self.skill_max_iterations,
            ComponentKind::Agent(spec) => spec.max_iterations.unwrap_or(self.agent_max_iterations),
            ComponentKind::Command(_) => 0,
        }
    }
}

/// Process-wide toggles, read at Registry load only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleConfig {
    /// Debug verbosity (`SKILLGRAPH_DEBUG`)
    #[serde(default)]
    pub debug: bool,

    /// Model for descriptors that omit `model` or say `inherit` (`SKILLGRAPH_MODEL`)
    #[serde(default)]
    pub default_model: Option<String>,

    /// Skills forced to `enabled=false` (`SKILLGRAPH_DISABLE_SKILLS`)
    #[serde(default)]
    pub disabled_skills: Vec<String>,
}
