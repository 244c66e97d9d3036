//! Core types for the tiered extension runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// CallID: unique identifier of a single invocation (top-level or nested)
pub type CallId = uuid::Uuid;

/// Invocation tier of a component. Defines the legal call directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Auto-triggered reactive task; may never invoke another component
    Skill,
    /// Explicitly invoked expert; may invoke Skills
    Agent,
    /// Multi-step workflow; may invoke Agents
    Command,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Skill, Tier::Agent, Tier::Command];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Skill => "skill",
            Tier::Agent => "agent",
            Tier::Command => "command",
        }
    }

    /// Parse an explicit tier name. Unknown names are rejected, never guessed.
    pub fn parse(value: &str) -> Option<Tier> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skill" => Some(Tier::Skill),
            "agent" => Some(Tier::Agent),
            "command" => Some(Tier::Command),
            _ => None,
        }
    }

    /// Infer a tier from a conventional directory name (`skills/`, `agents/`, `commands/`).
    pub fn from_dir_name(name: &str) -> Option<Tier> {
        match name {
            "skills" => Some(Tier::Skill),
            "agents" => Some(Tier::Agent),
            "commands" => Some(Tier::Command),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Skill dispatch priority. Orders as `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    Medium = 1,
    High = 2,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Priority> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability name checked by the sandbox at every tool use.
///
/// Host tool names (`Read`, `Bash`, `Task`, ...) are normalised to capability
/// names on construction, so `Capability::new("Bash")` equals
/// `Capability::new("execute-external-process")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Capability(String);

impl Capability {
    pub const READ: &'static str = "read";
    pub const WRITE: &'static str = "write";
    pub const EDIT: &'static str = "edit";
    pub const SEARCH: &'static str = "search";
    pub const WEB: &'static str = "web";
    pub const EXECUTE_EXTERNAL_PROCESS: &'static str = "execute-external-process";
    pub const INVOKE_COMPONENT: &'static str = "invoke-component";

    pub fn new(name: &str) -> Self {
        let lowered = name.trim().to_ascii_lowercase();
        let canonical = match lowered.as_str() {
            "read" | "notebookread" => Self::READ,
            "write" => Self::WRITE,
            "edit" | "multiedit" | "notebookedit" => Self::EDIT,
            "search" | "grep" | "glob" | "ls" => Self::SEARCH,
            "web" | "webfetch" | "websearch" => Self::WEB,
            "bash" | "shell" | "execute-external-process" => Self::EXECUTE_EXTERNAL_PROCESS,
            "task" | "invoke-component" => Self::INVOKE_COMPONENT,
            _ => return Capability(lowered),
        };
        Capability(canonical.to_string())
    }

    pub fn invoke_component() -> Self {
        Capability(Self::INVOKE_COMPONENT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Capabilities a Skill may never hold.
    pub fn is_forbidden_for_skill(&self) -> bool {
        self.0 == Self::EXECUTE_EXTERNAL_PROCESS || self.0 == Self::INVOKE_COMPONENT
    }
}

impl From<String> for Capability {
    fn from(value: String) -> Self {
        Capability::new(&value)
    }
}

impl From<&str> for Capability {
    fn from(value: &str) -> Self {
        Capability::new(value)
    }
}

impl From<Capability> for String {
    fn from(value: Capability) -> Self {
        value.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
