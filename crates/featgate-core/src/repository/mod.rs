//! Feature repositories and their loading.

mod manager;

pub use manager::RepositoryManager;

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::downloader::ArtifactFetcher;
use crate::error::MetadataLoadError;
use crate::feature::{Feature, FeaturesDescriptor};

/// Loaded repositories keyed by URI, in discovery order
pub type RepositoryMap = IndexMap<String, Arc<Repository>>;

/// A features descriptor loaded from a URI
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    pub uri: String,
    pub name: Option<String>,
    /// Nested repository URIs
    pub repositories: Vec<String>,
    pub features: Vec<Arc<Feature>>,
}

impl Repository {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: None,
            repositories: Vec::new(),
            features: Vec::new(),
        }
    }

    pub fn from_descriptor(uri: impl Into<String>, descriptor: FeaturesDescriptor) -> Self {
        Self {
            uri: uri.into(),
            name: descriptor.name.clone(),
            repositories: descriptor
                .repositories
                .iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
            features: descriptor.to_features().into_iter().map(Arc::new).collect(),
        }
    }

    /// Add a feature (builder style, mostly for tests)
    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.features.push(Arc::new(feature));
        self
    }

    /// Add a nested repository reference (builder style, mostly for tests)
    pub fn with_repository(mut self, uri: impl Into<String>) -> Self {
        self.repositories.push(uri.into());
        self
    }
}

#[async_trait]
pub trait RepositoryLoader: Send + Sync {
    async fn load(&self, uri: &str) -> Result<Repository, MetadataLoadError>;
}

/// Loads JSON features descriptors through an artifact fetcher
pub struct DescriptorLoader {
    fetcher: Arc<dyn ArtifactFetcher>,
}

impl DescriptorLoader {
    pub fn new(fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl RepositoryLoader for DescriptorLoader {
    async fn load(&self, uri: &str) -> Result<Repository, MetadataLoadError> {
        log::debug!("Loading features descriptor {}", uri);
        let bytes = self
            .fetcher
            .fetch_bytes(uri)
            .await
            .map_err(|source| MetadataLoadError::Fetch {
                uri: uri.to_string(),
                source,
            })?;

        let descriptor = FeaturesDescriptor::from_slice(&bytes).map_err(|source| MetadataLoadError::Parse {
            uri: uri.to_string(),
            source,
        })?;

        if let Some(feature) = descriptor.features.iter().find(|f| f.name.trim().is_empty()) {
            return Err(MetadataLoadError::Invalid {
                uri: uri.to_string(),
                message: format!("feature with empty name (version {:?})", feature.version),
            });
        }

        Ok(Repository::from_descriptor(uri, descriptor))
    }
}

/// Load the requested repositories and, breadth-first, every repository they reference
///
/// Fails on the first descriptor that cannot be loaded, and when two loaded
/// repositories declare the same feature identity.
pub async fn load_repositories(
    loader: &dyn RepositoryLoader,
    uris: &[String],
) -> Result<RepositoryMap, MetadataLoadError> {
    let mut loaded = RepositoryMap::new();
    let mut queue: VecDeque<String> = uris.iter().map(|u| u.trim().to_string()).collect();

    while let Some(uri) = queue.pop_front() {
        if uri.is_empty() || loaded.contains_key(&uri) {
            continue;
        }
        let repository = loader.load(&uri).await?;
        log::debug!(
            "Loaded {} ({} features, {} nested repositories)",
            uri,
            repository.features.len(),
            repository.repositories.len()
        );
        queue.extend(repository.repositories.iter().cloned());
        loaded.insert(uri, Arc::new(repository));
    }

    check_duplicates(&loaded)?;
    Ok(loaded)
}

/// Reject feature identities declared by more than one repository
pub fn check_duplicates(repositories: &RepositoryMap) -> Result<(), MetadataLoadError> {
    let mut seen: IndexMap<String, &str> = IndexMap::new();
    for (uri, repository) in repositories {
        for feature in &repository.features {
            let id = feature.id().to_string();
            if let Some(first) = seen.get(&id) {
                return Err(MetadataLoadError::DuplicateFeature {
                    id,
                    first: first.to_string(),
                    second: uri.clone(),
                });
            }
            seen.insert(id, uri.as_str());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArtifactFetchError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct StaticLoader {
        repositories: HashMap<String, Repository>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RepositoryLoader for StaticLoader {
        async fn load(&self, uri: &str) -> Result<Repository, MetadataLoadError> {
            self.calls.lock().unwrap().push(uri.to_string());
            self.repositories
                .get(uri)
                .cloned()
                .ok_or_else(|| MetadataLoadError::Fetch {
                    uri: uri.to_string(),
                    source: ArtifactFetchError::NotFound {
                        location: uri.to_string(),
                        tried: Vec::new(),
                    },
                })
        }
    }

    fn loader(repositories: Vec<Repository>) -> StaticLoader {
        StaticLoader {
            repositories: repositories.into_iter().map(|r| (r.uri.clone(), r)).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_load_follows_nested_repositories_breadth_first() {
        let loader = loader(vec![
            Repository::new("a")
                .with_repository("b")
                .with_repository("c")
                .with_feature(Feature::new("fa", "1.0")),
            Repository::new("b").with_repository("d").with_repository("a"),
            Repository::new("c"),
            Repository::new("d").with_feature(Feature::new("fd", "1.0")),
        ]);

        let loaded = load_repositories(&loader, &["a".to_string()]).await.unwrap();
        let order: Vec<&str> = loaded.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
        assert_eq!(loader.calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_load_failure_aborts() {
        let loader = loader(vec![Repository::new("a").with_repository("missing")]);
        let err = load_repositories(&loader, &["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, MetadataLoadError::Fetch { ref uri, .. } if uri == "missing"));
    }

    #[tokio::test]
    async fn test_duplicate_feature_identity() {
        let loader = loader(vec![
            Repository::new("a").with_feature(Feature::new("core", "1.0.0")),
            Repository::new("b").with_feature(Feature::new("core", "1.0.0")),
        ]);
        let err = load_repositories(&loader, &["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        match err {
            MetadataLoadError::DuplicateFeature { id, first, second } => {
                assert_eq!(id, "core/1.0.0");
                assert_eq!(first, "a");
                assert_eq!(second, "b");
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn test_same_name_different_versions_is_fine() {
        let mut map = RepositoryMap::new();
        map.insert(
            "a".to_string(),
            Arc::new(
                Repository::new("a")
                    .with_feature(Feature::new("core", "1.0.0"))
                    .with_feature(Feature::new("core", "2.0.0")),
            ),
        );
        assert!(check_duplicates(&map).is_ok());
    }
}
