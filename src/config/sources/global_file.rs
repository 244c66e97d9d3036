//! Global config file source: `$XDG_CONFIG_HOME/skillgraph/config.toml`.

use crate::config::xdg;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::path::Path;

/// Add the global file (optional) to the builder. `override_path` replaces the XDG location.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    override_path: Option<&Path>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let path = match override_path {
        Some(path) => path.to_path_buf(),
        None => match xdg::global_config_path() {
            Some(path) => path,
            None => return Ok(builder),
        },
    };
    Ok(builder.add_source(File::from(path.as_path()).required(false)))
}
