//! Base layer of the merge: built-in defaults for the scheduler limits.

use crate::config::{DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_DEPTH, DEFAULT_MAX_QUEUE_SIZE};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder seeded with defaults. Every later source overrides these.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("scheduler.max_concurrency", DEFAULT_MAX_CONCURRENCY as i64)?
        .set_default("scheduler.max_queue_size", DEFAULT_MAX_QUEUE_SIZE as i64)?
        .set_default("scheduler.max_depth", DEFAULT_MAX_DEPTH as i64)
}
