//! Raw descriptor records as they appear on disk.
//!
//! Every supported file format is first decoded into `serde_json::Value` and
//! then into `RawDescriptor`, so YAML, TOML, JSON and Markdown front matter
//! share a single field vocabulary.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Descriptor record before validation. Every field is optional here; the
/// validator decides what is required for each tier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDescriptor {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tier: Option<String>,
    #[serde(alias = "allowed-tools", alias = "allowed_tools")]
    pub tools: Option<ToolList>,
    pub model: Option<String>,
    pub enabled: Option<bool>,
    pub priority: Option<String>,
    #[serde(alias = "trigger-keywords", alias = "triggers")]
    pub trigger_keywords: Option<Vec<String>>,
    #[serde(alias = "file-patterns")]
    pub file_patterns: Option<Vec<String>>,
    #[serde(alias = "exclude-patterns")]
    pub exclude_patterns: Option<Vec<String>>,
    pub order: Option<u32>,
    pub capabilities: Option<Vec<String>>,
    #[serde(alias = "max-iterations")]
    pub max_iterations: Option<i64>,
    pub timeout: Option<TimeoutValue>,
    pub category: Option<String>,
    pub usage: Option<String>,
    pub parameters: Option<BTreeMap<String, RawParameter>>,
    pub agents: Option<Vec<String>>,
    pub steps: Option<Vec<RawStep>>,

    /// Markdown body, when the descriptor came from a front-matter file
    #[serde(skip)]
    pub instructions: Option<String>,

    /// Fields this runtime does not interpret (reported as warnings)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// `tools` as either a list or a comma-separated string (`"Read, Grep, Glob"`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ToolList {
    List(Vec<String>),
    Csv(String),
}

impl ToolList {
    pub fn names(&self) -> Vec<String> {
        match self {
            ToolList::List(items) => items
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            ToolList::Csv(s) => s
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

/// Timeout as integer seconds or a duration string (`30s`, `5m`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimeoutValue {
    Seconds(u64),
    Text(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawParameter {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub description: Option<String>,
    pub required: Option<bool>,
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStep {
    pub id: Option<String>,
    pub agent: Option<String>,
    pub task: Option<String>,
    pub prompt: Option<String>,
    #[serde(default, alias = "depends-on", alias = "after")]
    pub depends_on: Vec<String>,
    pub policy: Option<String>,
}

/// Descriptor file formats recognised by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorFormat {
    Yaml,
    Json,
    Toml,
    Markdown,
}

impl DescriptorFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(DescriptorFormat::Yaml),
            "json" => Some(DescriptorFormat::Json),
            "toml" => Some(DescriptorFormat::Toml),
            "md" => Some(DescriptorFormat::Markdown),
            _ => None,
        }
    }
}

/// Decode a descriptor file's contents into a raw record.
pub fn parse_descriptor(content: &str, format: DescriptorFormat) -> Result<RawDescriptor, String> {
    let (value, instructions) = match format {
        DescriptorFormat::Yaml => (
            serde_yaml::from_str::<serde_json::Value>(content)
                .map_err(|e| format!("invalid YAML: {}", e))?,
            None,
        ),
        DescriptorFormat::Json => (
            serde_json::from_str::<serde_json::Value>(content)
                .map_err(|e| format!("invalid JSON: {}", e))?,
            None,
        ),
        DescriptorFormat::Toml => (
            toml::from_str::<serde_json::Value>(content)
                .map_err(|e| format!("invalid TOML: {}", e))?,
            None,
        ),
        DescriptorFormat::Markdown => {
            let (front, body) = split_front_matter(content)
                .ok_or_else(|| "missing '---' front matter block".to_string())?;
            let value = serde_yaml::from_str::<serde_json::Value>(front)
                .map_err(|e| format!("invalid front matter: {}", e))?;
            let body = body.trim();
            (value, (!body.is_empty()).then(|| body.to_string()))
        }
    };

    if !value.is_object() {
        return Err("descriptor must be a mapping of fields".to_string());
    }

    let mut raw: RawDescriptor =
        serde_json::from_value(value).map_err(|e| format!("invalid field: {}", e))?;
    raw.instructions = instructions;
    Ok(raw)
}

/// Split `---\n<yaml>\n---\n<body>` into its two parts.
pub fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let rest = content
        .strip_prefix("---\r\n")
        .or_else(|| content.strip_prefix("---\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((front, body));
        }
        offset += line.len();
    }
    None
}
