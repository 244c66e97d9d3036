//! MergeService: orchestrates sources, applies merge policy, deserializes to RuntimeConfig.

use crate::config::sources::{environment, global_file, workspace_file};
use crate::config::RuntimeConfig;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::merge_policy;

/// Overrides for where configuration is read from. The default reads the
/// real global file and the process environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Replaces the XDG global config file
    pub global_file: Option<PathBuf>,
    /// Replaces the process environment (for both `SKILLGRAPH_*` keys and toggles)
    pub env: Option<HashMap<String, String>>,
}

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Load config from workspace and standard sources.
    /// Precedence: defaults -> global file -> workspace file -> environment
    /// -> toggles (highest).
    pub fn load(
        workspace_root: &Path,
        sources: &ConfigSources,
    ) -> Result<RuntimeConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder, sources.global_file.as_deref())?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        Self::finish(builder, workspace_root, sources)
    }

    /// Load config from a specific file with environment overlay.
    pub fn load_from_file(
        path: &Path,
        workspace_root: &Path,
        sources: &ConfigSources,
    ) -> Result<RuntimeConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?.add_source(File::from(path));
        Self::finish(builder, workspace_root, sources)
    }

    fn finish(
        builder: ConfigBuilder<DefaultState>,
        workspace_root: &Path,
        sources: &ConfigSources,
    ) -> Result<RuntimeConfig, ConfigError> {
        let builder = environment::add_to_builder(builder, sources.env.as_ref())?;
        let builder = environment::add_toggles(builder, sources.env.as_ref())?;

        let mut config: RuntimeConfig = builder.build()?.try_deserialize()?;
        config.registry.workspace_root = workspace_root.to_path_buf();
        Ok(config)
    }
}
