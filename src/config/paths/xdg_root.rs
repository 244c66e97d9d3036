//! XDG Base Directory utilities for config file locations.

use crate::config::WORKSPACE_DIR;
use std::path::{Path, PathBuf};

/// Get XDG config home directory
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise the platform config directory.
pub fn config_home() -> Option<PathBuf> {
    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg_config_home.is_empty() {
            return Some(PathBuf::from(xdg_config_home));
        }
    }
    directories::BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf())
}

/// `$XDG_CONFIG_HOME/skillgraph/config.toml`
pub fn global_config_path() -> Option<PathBuf> {
    config_home().map(|home| home.join("skillgraph").join("config.toml"))
}

/// `<workspace>/.skillgraph/config.toml`
pub fn workspace_config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(WORKSPACE_DIR).join("config.toml")
}
