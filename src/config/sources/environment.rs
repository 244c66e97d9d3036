//! Environment variable source: SKILLGRAPH_* prefix with __ separator, plus
//! the named toggles.

use crate::config::ToggleConfig;
use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;
use std::collections::HashMap;

pub const DEBUG_VAR: &str = "SKILLGRAPH_DEBUG";
pub const MODEL_VAR: &str = "SKILLGRAPH_MODEL";
pub const DISABLE_SKILLS_VAR: &str = "SKILLGRAPH_DISABLE_SKILLS";

/// Add environment variable overlay to builder.
/// Uses SKILLGRAPH_ prefix and __ as separator for nested keys.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    vars: Option<&HashMap<String, String>>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = builder.add_source(
        Environment::with_prefix("SKILLGRAPH")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(vars.cloned()),
    );
    Ok(builder)
}

/// Named toggles present in the environment; `None` where a variable is unset.
struct ToggleOverrides {
    debug: Option<bool>,
    model: Option<String>,
    disabled: Option<Vec<String>>,
}

impl ToggleOverrides {
    fn read(vars: Option<&HashMap<String, String>>) -> Self {
        Self {
            debug: lookup(vars, DEBUG_VAR).map(|v| is_truthy(&v)),
            model: lookup(vars, MODEL_VAR).filter(|v| !v.trim().is_empty()),
            disabled: lookup(vars, DISABLE_SKILLS_VAR).map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
        }
    }
}

/// Apply the named toggles as overrides; they win over every other layer.
pub fn add_toggles(
    builder: ConfigBuilder<DefaultState>,
    vars: Option<&HashMap<String, String>>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let overrides = ToggleOverrides::read(vars);
    builder
        .set_override_option("toggles.debug", overrides.debug)?
        .set_override_option("toggles.default_model", overrides.model)?
        .set_override_option("toggles.disabled_skills", overrides.disabled)
}

/// Re-read the named toggles on top of `current`. Unset variables keep the
/// loaded value. `vars` replaces the process environment when given.
pub fn refresh_toggles(
    current: &ToggleConfig,
    vars: Option<&HashMap<String, String>>,
) -> ToggleConfig {
    let overrides = ToggleOverrides::read(vars);
    ToggleConfig {
        debug: overrides.debug.unwrap_or(current.debug),
        default_model: overrides.model.or_else(|| current.default_model.clone()),
        disabled_skills: overrides
            .disabled
            .unwrap_or_else(|| current.disabled_skills.clone()),
    }
}

fn lookup(vars: Option<&HashMap<String, String>>, key: &str) -> Option<String> {
    match vars {
        Some(map) => map.get(key).cloned(),
        None => std::env::var(key).ok(),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
