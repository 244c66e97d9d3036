//! ConfigLoader facade delegating to merge service.

use super::merge::service::{ConfigSources, MergeService};
use super::RuntimeConfig;
use config::ConfigError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from files and the process environment.
    pub fn load(workspace_root: &Path) -> Result<RuntimeConfig, ConfigError> {
        MergeService::load(workspace_root, &ConfigSources::default())
    }

    /// Load configuration with explicit sources (alternate global file, injected environment).
    pub fn load_with(
        workspace_root: &Path,
        sources: &ConfigSources,
    ) -> Result<RuntimeConfig, ConfigError> {
        MergeService::load(workspace_root, sources)
    }

    /// Load configuration from a specific file, with environment overlay.
    pub fn load_from_file(
        path: &Path,
        workspace_root: &Path,
    ) -> Result<RuntimeConfig, ConfigError> {
        MergeService::load_from_file(path, workspace_root, &ConfigSources::default())
    }

    /// Create default configuration.
    pub fn default_for(workspace_root: &Path) -> RuntimeConfig {
        RuntimeConfig::for_workspace(workspace_root)
    }
}
