//! Concurrent cache of resolution snapshots

use crate::Result;
use crate::resolver::{Resolution, resolve_all};
use dashmap::DashMap;
use proto_ir::Root;
use std::sync::Arc;
use tracing::{debug, trace};

/// Thread-safe cache of resolved trees, keyed by file name.
///
/// A cached snapshot is reused only while it is current for the tree passed in;
/// a tree mutated since the last pass is resolved again and the entry replaced.
pub struct ResolutionRegistry {
    entries: DashMap<String, Arc<Resolution>>,
}

impl ResolutionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Resolve `root` under `name`, reusing the cached snapshot when still current
    pub fn resolve(&self, name: &str, root: &Root) -> Result<Arc<Resolution>> {
        if let Some(cached) = self.entries.get(name) {
            if cached.is_current(root) {
                debug!("Cache hit for resolution: {}", name);
                return Ok(Arc::clone(cached.value()));
            }
            trace!("Stale resolution for {} (revision {})", name, cached.revision());
        }

        let resolution = Arc::new(resolve_all(root)?);
        self.entries
            .insert(name.to_string(), Arc::clone(&resolution));
        Ok(resolution)
    }

    /// Cached snapshot, current or not
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Resolution>> {
        self.entries.get(name).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Drop a cached snapshot
    pub fn remove(&self, name: &str) -> Option<Arc<Resolution>> {
        self.entries.remove(name).map(|(_, resolution)| resolution)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ResolutionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
