//! Artifact fetching.
//!
//! [`ArtifactFetcher`] materializes artifact locations into bytes, manifests
//! and resources. [`DownloadManager`] is the default implementation backed by
//! the local Maven repository, a cache directory and remote repositories.

mod archive;
mod checksum;
mod manager;
mod memory;
mod mvn;
mod wrap;

#[cfg(test)]
pub(crate) use archive::test_support;
pub use archive::{ArchiveReader, ArchiveType};
pub use checksum::{compute as compute_checksum, verify as verify_checksum, ChecksumType};
pub use manager::{DownloadConfig, DownloadManager, MAVEN_CENTRAL};
pub use memory::MemoryFetcher;
pub use mvn::MavenCoordinate;
pub use wrap::{ArchiveWrapper, JarWrapper, WrapUrl};

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use crate::error::ArtifactFetchError;
use crate::resource::{Manifest, Resource, ResourceBuilder, MANIFEST_PATH};

/// Default number of artifacts fetched concurrently
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Raw content of a location
    async fn fetch_bytes(&self, location: &str) -> Result<Arc<Vec<u8>>, ArtifactFetchError>;

    /// Manifest of the archive at a location
    async fn fetch_manifest(&self, location: &str) -> Result<Arc<Manifest>, ArtifactFetchError> {
        let bytes = self.fetch_bytes(location).await?;
        read_manifest(location, &bytes).map(Arc::new)
    }

    /// Resource description of the bundle at a location
    async fn fetch(&self, location: &str) -> Result<Arc<Resource>, ArtifactFetchError> {
        let manifest = self.fetch_manifest(location).await?;
        if !manifest.is_bundle() {
            return Err(ArtifactFetchError::NotABundle {
                location: location.to_string(),
            });
        }
        ResourceBuilder::build(location, &manifest)
            .map(Arc::new)
            .map_err(|e| ArtifactFetchError::Manifest {
                location: location.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Read `META-INF/MANIFEST.MF` from jar bytes
pub fn read_manifest(location: &str, bytes: &[u8]) -> Result<Manifest, ArtifactFetchError> {
    let content = ArchiveReader::new(bytes, ArchiveType::Zip)
        .read_entry(MANIFEST_PATH)
        .map_err(|reason| ArtifactFetchError::Archive {
            location: location.to_string(),
            reason,
        })?
        .ok_or_else(|| ArtifactFetchError::NotABundle {
            location: location.to_string(),
        })?;

    Manifest::parse(&content).map_err(|e| ArtifactFetchError::Manifest {
        location: location.to_string(),
        reason: e.to_string(),
    })
}

/// Fetch many resources with at most `max_concurrent` in flight
///
/// Results are returned in input order.
pub async fn fetch_all<I>(
    fetcher: &dyn ArtifactFetcher,
    locations: I,
    max_concurrent: usize,
) -> Vec<(String, Result<Arc<Resource>, ArtifactFetchError>)>
where
    I: IntoIterator<Item = String>,
{
    let mut results: Vec<(usize, String, Result<Arc<Resource>, ArtifactFetchError>)> =
        stream::iter(locations.into_iter().enumerate())
            .map(|(idx, location)| async move {
                let result = fetcher.fetch(&location).await;
                (idx, location, result)
            })
            .buffer_unordered(max_concurrent.max(1))
            .collect()
            .await;

    results.sort_by_key(|(idx, _, _)| *idx);
    results
        .into_iter()
        .map(|(_, location, result)| (location, result))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::test_support::jar;
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MapFetcher {
        artifacts: HashMap<String, Vec<u8>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ArtifactFetcher for MapFetcher {
        async fn fetch_bytes(&self, location: &str) -> Result<Arc<Vec<u8>>, ArtifactFetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.artifacts
                .get(location)
                .cloned()
                .map(Arc::new)
                .ok_or_else(|| ArtifactFetchError::NotFound {
                    location: location.to_string(),
                    tried: Vec::new(),
                })
        }
    }

    fn fetcher() -> MapFetcher {
        let mut artifacts = HashMap::new();
        for i in 0..6 {
            let name = format!("b{}", i);
            artifacts.insert(
                format!("mvn:org.example/{}/1.0", name),
                jar(&[("Bundle-SymbolicName", name.as_str())], &[]),
            );
        }
        artifacts.insert("mvn:org.example/plain/1.0".to_string(), jar(&[], &[]));
        MapFetcher {
            artifacts,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_fetch_default_builds_resource() {
        let fetcher = fetcher();
        let resource = fetcher.fetch("mvn:org.example/b1/1.0").await.unwrap();
        assert_eq!(resource.symbolic_name, "b1");
        assert_eq!(resource.id, "mvn:org.example/b1/1.0");

        let err = fetcher.fetch("mvn:org.example/plain/1.0").await.unwrap_err();
        assert!(matches!(err, ArtifactFetchError::NotABundle { .. }));
    }

    #[tokio::test]
    async fn test_fetch_all_bounded_and_ordered() {
        let fetcher = fetcher();
        let mut locations: Vec<String> = (0..6).map(|i| format!("mvn:org.example/b{}/1.0", i)).collect();
        locations.push("mvn:org.example/missing/1.0".to_string());

        let results = fetch_all(&fetcher, locations.clone(), 2).await;
        let returned: Vec<String> = results.iter().map(|(l, _)| l.clone()).collect();
        assert_eq!(returned, locations);
        assert!(results[..6].iter().all(|(_, r)| r.is_ok()));
        assert!(results[6].1.is_err());
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 2);
    }
}
