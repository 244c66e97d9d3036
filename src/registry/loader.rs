//! Descriptor discovery and loading.
//!
//! Walks each root in configured order, files lexicographically within a
//! root. A file that fails to read, parse or validate is reported and skipped;
//! it never blocks the rest of the load.

use crate::config::ToggleConfig;
use crate::descriptor::{
    parse_descriptor, validate_descriptor, ComponentDescriptor, DescriptorFormat,
    ValidationContext,
};
use crate::error::ConfigValidationError;
use crate::types::Tier;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Everything one pass over the descriptor roots produced.
#[derive(Debug, Default)]
pub struct LoadedDescriptors {
    /// Valid, de-duplicated descriptors in load order
    pub descriptors: Vec<ComponentDescriptor>,
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<String>,
}

pub fn load_roots(roots: &[PathBuf], toggles: &ToggleConfig) -> LoadedDescriptors {
    let mut out = LoadedDescriptors::default();
    let mut seen: HashMap<(Tier, String), PathBuf> = HashMap::new();

    for root in roots {
        if !root.is_dir() {
            debug!(root = %root.display(), "Descriptor root missing, skipping");
            continue;
        }
        for path in discover(root, &mut out.errors) {
            let Some(descriptor) = load_file(root, &path, toggles, &mut out) else {
                continue;
            };
            let key = (descriptor.tier(), descriptor.name.clone());
            if let Some(first) = seen.get(&key) {
                out.errors.push(ConfigValidationError::new(
                    &path,
                    Some(descriptor.name.clone()),
                    format!(
                        "duplicate {} name (first defined in {})",
                        descriptor.tier(),
                        first.display()
                    ),
                ));
                continue;
            }
            seen.insert(key, path);
            out.descriptors.push(descriptor);
        }
    }
    out
}

/// Descriptor files under `root`, sorted by path.
fn discover(root: &Path, errors: &mut Vec<ConfigValidationError>) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name().follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                errors.push(ConfigValidationError::new(path, None, e.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_file() || is_ignored(entry.path()) {
            continue;
        }
        if DescriptorFormat::from_path(entry.path()).is_some() {
            files.push(entry.into_path());
        }
    }
    files
}

fn is_ignored(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return true;
    };
    name.starts_with('.') || name.eq_ignore_ascii_case("readme.md")
}

fn load_file(
    root: &Path,
    path: &Path,
    toggles: &ToggleConfig,
    out: &mut LoadedDescriptors,
) -> Option<ComponentDescriptor> {
    let format = DescriptorFormat::from_path(path)?;
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            out.errors
                .push(ConfigValidationError::new(path, None, format!("unreadable: {}", e)));
            return None;
        }
    };
    let raw = match parse_descriptor(&content, format) {
        Ok(raw) => raw,
        Err(message) => {
            out.errors.push(ConfigValidationError::new(path, None, message));
            return None;
        }
    };

    let name = raw.name.clone();
    let ctx = ValidationContext {
        path,
        inferred_tier: infer_tier(root, path),
        toggles,
    };
    match validate_descriptor(raw, &ctx) {
        Ok(validated) => {
            for warning in validated.warnings {
                warn!(path = %path.display(), name = %validated.descriptor.name, "{}", warning);
                out.warnings.push(format!(
                    "{} [{}]: {}",
                    path.display(),
                    validated.descriptor.name,
                    warning
                ));
            }
            Some(validated.descriptor)
        }
        Err(messages) => {
            for message in messages {
                out.errors
                    .push(ConfigValidationError::new(path, name.clone(), message));
            }
            None
        }
    }
}

/// Nearest directory between the file and `root` (inclusive) named
/// `skills`, `agents`, or `commands`.
pub fn infer_tier(root: &Path, path: &Path) -> Option<Tier> {
    for dir in path.ancestors().skip(1) {
        if let Some(tier) = dir
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(Tier::from_dir_name)
        {
            return Some(tier);
        }
        if dir == root {
            break;
        }
    }
    None
}
