//! Component descriptors: on-disk records, typed per-tier variants, and the
//! load-time validation between them.

pub mod component;
pub mod params;
pub mod raw;
pub mod validation;

pub use component::{
    AgentSpec, CommandSpec, ComponentDescriptor, ComponentKind, FailurePolicy, SkillSpec,
    StepAction, WorkflowStep,
};
pub use params::{render_value, BoundParams, ParamType, ParameterSchema, ParameterSpec};
pub use raw::{parse_descriptor, DescriptorFormat, RawDescriptor};
pub use validation::{
    default_tools, parse_duration, validate_descriptor, ValidationContext, Validated,
};

use crate::config::ToggleConfig;
use crate::types::Tier;
use std::path::Path;

/// Parse and validate one descriptor from text, without touching the
/// filesystem. Uses default toggles.
pub fn descriptor_from_str(
    content: &str,
    format: DescriptorFormat,
    tier_hint: Option<Tier>,
) -> Result<ComponentDescriptor, Vec<String>> {
    let raw = parse_descriptor(content, format).map_err(|e| vec![e])?;
    let toggles = ToggleConfig::default();
    let ctx = ValidationContext {
        path: Path::new("<inline>"),
        inferred_tier: tier_hint,
        toggles: &toggles,
    };
    validate_descriptor(raw, &ctx).map(|v| v.descriptor)
}
