use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::ArtifactFetcher;
use crate::error::ArtifactFetchError;

/// Fetcher serving artifacts registered up front
///
/// Useful for dry runs over prepared content and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    artifacts: HashMap<String, Arc<Vec<u8>>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(mut self, location: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(location, bytes);
        self
    }

    pub fn insert(&mut self, location: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.artifacts.insert(location.into(), Arc::new(bytes.into()));
    }

    pub fn contains(&self, location: &str) -> bool {
        self.artifacts.contains_key(location)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[async_trait]
impl ArtifactFetcher for MemoryFetcher {
    async fn fetch_bytes(&self, location: &str) -> Result<Arc<Vec<u8>>, ArtifactFetchError> {
        self.artifacts
            .get(location)
            .cloned()
            .ok_or_else(|| ArtifactFetchError::NotFound {
                location: location.to_string(),
                tried: vec!["memory".to_string()],
            })
    }
}
