//! Component Registry
//!
//! Loads and validates descriptors, then publishes them as one immutable
//! [`Snapshot`] behind a swappable pointer. Readers take an `Arc` clone of the
//! current snapshot; a reload swaps the pointer and never mutates a published
//! snapshot.

pub mod loader;
pub mod snapshot;

pub use snapshot::Snapshot;

use crate::config::sources::environment;
use crate::config::RuntimeConfig;
use crate::descriptor::ComponentDescriptor;
use crate::error::ConfigValidationError;
use crate::types::Tier;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a load or reload.
#[derive(Debug, Default, Serialize)]
pub struct LoadReport {
    /// Version of the snapshot this load published
    pub version: u64,
    pub loaded: usize,
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<String>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Registry owning every component descriptor.
pub struct Registry {
    current: RwLock<Arc<Snapshot>>,
}

impl Registry {
    /// Load descriptors from the configured roots.
    pub fn load(config: &RuntimeConfig) -> (Self, LoadReport) {
        let registry = Self {
            current: RwLock::new(Arc::new(Snapshot::default())),
        };
        let report = registry.reload(config);
        (registry, report)
    }

    /// Registry over an in-memory descriptor set.
    pub fn from_descriptors(descriptors: Vec<ComponentDescriptor>) -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::new(1, descriptors))),
        }
    }

    /// Re-read every root and the named toggles, then publish a new
    /// snapshot. Calls already in flight keep the snapshot they started with.
    pub fn reload(&self, config: &RuntimeConfig) -> LoadReport {
        self.reload_with_env(config, None)
    }

    /// [`Registry::reload`] reading toggles from `vars` instead of the
    /// process environment.
    pub fn reload_with_env(
        &self,
        config: &RuntimeConfig,
        vars: Option<&HashMap<String, String>>,
    ) -> LoadReport {
        let toggles = environment::refresh_toggles(&config.toggles, vars);
        if toggles != config.toggles {
            debug!(?toggles, "Toggles changed since configuration load");
        }
        let roots = config.registry.resolved_paths();
        let loaded = loader::load_roots(&roots, &toggles);
        let mut warnings = loaded.warnings;
        warnings.extend(cross_check(&loaded.descriptors));

        let snapshot = self.publish(loaded.descriptors);
        for error in &loaded.errors {
            warn!(error = %error, "Descriptor rejected");
        }
        info!(
            version = snapshot.version(),
            loaded = snapshot.len(),
            errors = loaded.errors.len(),
            warnings = warnings.len(),
            "Registry snapshot published"
        );

        LoadReport {
            version: snapshot.version(),
            loaded: snapshot.len(),
            errors: loaded.errors,
            warnings,
        }
    }

    /// Swap in a snapshot built from `descriptors`.
    pub fn publish(&self, descriptors: Vec<ComponentDescriptor>) -> Arc<Snapshot> {
        let mut current = self.current.write();
        let snapshot = Arc::new(Snapshot::new(current.version() + 1, descriptors));
        *current = snapshot.clone();
        snapshot
    }

    /// Current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.current.read().version()
    }
}

/// Cross-descriptor references that cannot be resolved. Reported, never rejected.
fn cross_check(descriptors: &[ComponentDescriptor]) -> Vec<String> {
    let mut warnings = Vec::new();
    for descriptor in descriptors {
        let Some(command) = descriptor.as_command() else {
            continue;
        };
        for agent in &command.agents {
            let known = descriptors
                .iter()
                .any(|d| d.tier() == Tier::Agent && &d.name == agent);
            if !known {
                warnings.push(format!(
                    "{} [{}]: agent '{}' is not registered",
                    descriptor.source.display(),
                    descriptor.name,
                    agent
                ));
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &std::path::Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_bad_descriptor_does_not_block_others() {
        let temp = tempfile::tempdir().unwrap();
        let base = temp.path().join(".skillgraph");
        write(
            &base,
            "skills/lint.yaml",
            "name: lint\ndescription: Lints\nfile_patterns: ['*.rs']\n",
        );
        write(
            &base,
            "skills/bad.yaml",
            "name: bad\ndescription: x\ntools: [Bash]\ntrigger_keywords: [x]\n",
        );
        write(
            &base,
            "agents/reviewer.md",
            "---\nname: reviewer\ndescription: Reviews\n---\nReview it.\n",
        );

        let config = RuntimeConfig::for_workspace(temp.path());
        let (registry, report) = Registry::load(&config);
        assert_eq!(report.loaded, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].name.as_deref(), Some("bad"));

        let snapshot = registry.snapshot();
        assert!(snapshot.get(Tier::Skill, "lint").is_some());
        assert!(snapshot.get(Tier::Agent, "reviewer").is_some());
        assert!(snapshot.get(Tier::Skill, "bad").is_none());
    }

    #[test]
    fn test_duplicate_names_within_tier_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let base = temp.path().join(".skillgraph");
        write(&base, "skills/a.yaml", "name: lint\ndescription: first\ntrigger_keywords: [x]\n");
        write(&base, "skills/b.yaml", "name: lint\ndescription: second\ntrigger_keywords: [x]\n");
        write(&base, "agents/lint.yaml", "name: lint\ndescription: agent of the same name\n");

        let (registry, report) = Registry::load(&RuntimeConfig::for_workspace(temp.path()));
        assert_eq!(report.loaded, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].message.contains("duplicate skill"));
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.get(Tier::Skill, "lint").unwrap().description, "first");
    }

    #[test]
    fn test_reload_swaps_snapshot_without_touching_old() {
        let temp = tempfile::tempdir().unwrap();
        let base = temp.path().join(".skillgraph");
        write(&base, "skills/lint.yaml", "name: lint\ndescription: v1\ntrigger_keywords: [x]\n");
        let config = RuntimeConfig::for_workspace(temp.path());
        let (registry, _) = Registry::load(&config);
        let before = registry.snapshot();

        write(&base, "skills/lint.yaml", "name: lint\ndescription: v2\ntrigger_keywords: [x]\n");
        let report = registry.reload(&config);
        assert_eq!(report.version, before.version() + 1);
        assert_eq!(before.get(Tier::Skill, "lint").unwrap().description, "v1");
        assert_eq!(
            registry.snapshot().get(Tier::Skill, "lint").unwrap().description,
            "v2"
        );
    }

    #[test]
    fn test_command_naming_unknown_agent_warns() {
        let temp = tempfile::tempdir().unwrap();
        let base = temp.path().join(".skillgraph");
        write(&base, "commands/audit.yaml", "name: audit\ndescription: Audits\nagents: [ghost]\n");
        let (_, report) = Registry::load(&RuntimeConfig::for_workspace(temp.path()));
        assert_eq!(report.loaded, 1);
        assert!(report.is_clean());
        assert!(report.warnings.iter().any(|w| w.contains("agent 'ghost'")));
    }
}
