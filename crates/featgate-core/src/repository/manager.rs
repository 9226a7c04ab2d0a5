use std::collections::BTreeSet;
use std::sync::Arc;

use featgate_version::VersionRange;

use super::{Repository, RepositoryMap};
use crate::feature::Feature;

/// Read-only view over every loaded repository
#[derive(Debug, Clone, Default)]
pub struct RepositoryManager {
    repositories: RepositoryMap,
}

impl RepositoryManager {
    pub fn new(repositories: RepositoryMap) -> Self {
        Self { repositories }
    }

    pub fn repositories(&self) -> &RepositoryMap {
        &self.repositories
    }

    pub fn get(&self, uri: &str) -> Option<&Arc<Repository>> {
        self.repositories.get(uri)
    }

    /// Every repository URI, sorted
    pub fn uris(&self) -> BTreeSet<String> {
        self.repositories.keys().cloned().collect()
    }

    /// Every feature, in discovery order
    pub fn features(&self) -> impl Iterator<Item = &Arc<Feature>> {
        self.repositories.values().flat_map(|r| r.features.iter())
    }

    /// Highest version of a feature matching an optional constraint
    pub fn find_feature(&self, name: &str, constraint: Option<&VersionRange>) -> Option<Arc<Feature>> {
        self.features()
            .filter(|f| f.name == name)
            .filter(|f| constraint.map(|c| c.includes(&f.parsed_version())).unwrap_or(true))
            .max_by(|a, b| a.parsed_version().cmp(&b.parsed_version()))
            .cloned()
    }

    /// Feature with an exact identity
    pub fn find_exact(&self, name: &str, version: &str) -> Option<Arc<Feature>> {
        self.features()
            .find(|f| f.name == name && f.version == version)
            .cloned()
    }
}
