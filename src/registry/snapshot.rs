//! Immutable registry snapshot.

use crate::descriptor::ComponentDescriptor;
use crate::types::Tier;
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only view of every registered component at one registry version.
///
/// In-flight invocations hold an `Arc<Snapshot>` for their whole lifetime;
/// a reload publishes a new snapshot and never touches this one.
#[derive(Debug, Default)]
pub struct Snapshot {
    version: u64,
    /// Components in registration order
    entries: Vec<Arc<ComponentDescriptor>>,
    index: HashMap<(Tier, String), usize>,
}

impl Snapshot {
    /// Build a snapshot. Registration order is the order given; on a
    /// duplicate `(tier, name)` the first entry wins.
    pub fn new(version: u64, descriptors: Vec<ComponentDescriptor>) -> Self {
        let mut entries = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());
        for mut descriptor in descriptors {
            let key = (descriptor.tier(), descriptor.name.clone());
            if index.contains_key(&key) {
                continue;
            }
            descriptor.registration = entries.len();
            index.insert(key, entries.len());
            entries.push(Arc::new(descriptor));
        }
        Self {
            version,
            entries,
            index,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, tier: Tier, name: &str) -> Option<&Arc<ComponentDescriptor>> {
        self.index
            .get(&(tier, name.to_string()))
            .map(|&i| &self.entries[i])
    }

    /// Look a name up in `preferred` first, then across tiers in `Tier::ALL` order.
    pub fn resolve(
        &self,
        name: &str,
        preferred: Option<Tier>,
    ) -> Option<&Arc<ComponentDescriptor>> {
        preferred
            .and_then(|tier| self.get(tier, name))
            .or_else(|| Tier::ALL.iter().find_map(|&tier| self.get(tier, name)))
    }

    /// Skills in registration order
    pub fn skills(&self) -> impl Iterator<Item = &Arc<ComponentDescriptor>> {
        self.of_tier(Tier::Skill)
    }

    pub fn of_tier(&self, tier: Tier) -> impl Iterator<Item = &Arc<ComponentDescriptor>> {
        self.entries.iter().filter(move |d| d.tier() == tier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ComponentDescriptor>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
