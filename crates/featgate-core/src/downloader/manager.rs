//! Default artifact fetcher.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use super::checksum;
use super::mvn::MavenCoordinate;
use super::wrap::{ArchiveWrapper, JarWrapper, WrapUrl};
use super::{read_manifest, ArtifactFetcher, DEFAULT_MAX_CONCURRENT};
use crate::error::ArtifactFetchError;
use crate::http::{HttpClient, HttpError};
use crate::resource::Manifest;

pub const MAVEN_CENTRAL: &str = "https://repo1.maven.org/maven2";

/// Where the download manager looks for artifacts
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Local Maven repository, searched first
    pub local_repository: Option<PathBuf>,
    /// Cache of previously downloaded artifacts, searched second
    pub cache_dir: Option<PathBuf>,
    /// Remote Maven repositories, searched in order
    pub remote_repositories: Vec<String>,
    pub max_concurrent: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            local_repository: None,
            cache_dir: None,
            remote_repositories: vec![MAVEN_CENTRAL.to_string()],
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// Fetches artifacts from Maven repositories, URLs and files
///
/// Artifact bytes and manifests are cached in memory for the lifetime of the
/// manager. Concurrent requests for the same location share one download.
pub struct DownloadManager {
    http: Arc<HttpClient>,
    config: DownloadConfig,
    wrapper: Arc<dyn ArchiveWrapper>,
    artifacts: RwLock<HashMap<String, Arc<Vec<u8>>>>,
    manifests: RwLock<HashMap<String, Arc<Manifest>>>,
    /// Per-location loading locks to prevent concurrent loads of the same artifact
    loading_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl DownloadManager {
    pub fn new(http: Arc<HttpClient>, config: DownloadConfig) -> Self {
        Self {
            http,
            config,
            wrapper: Arc::new(JarWrapper),
            artifacts: RwLock::new(HashMap::new()),
            manifests: RwLock::new(HashMap::new()),
            loading_locks: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the wrapper used for `wrap:` and `fab:` locations
    pub fn with_wrapper(mut self, wrapper: Arc<dyn ArchiveWrapper>) -> Self {
        self.wrapper = wrapper;
        self
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Locations loaded so far
    pub async fn cached_locations(&self) -> Vec<String> {
        let mut locations: Vec<String> = self.artifacts.read().await.keys().cloned().collect();
        locations.sort();
        locations
    }

    async fn load(&self, location: &str) -> Result<Vec<u8>, ArtifactFetchError> {
        if WrapUrl::is_wrapped(location) {
            let url = WrapUrl::parse(location)?;
            return Ok(self.fetch_bytes(&url.inner).await?.as_ref().clone());
        }

        if location.starts_with("mvn:") {
            let coordinate = MavenCoordinate::parse_url(location)
                .ok_or_else(|| ArtifactFetchError::InvalidLocation(location.to_string()))?;
            return self.load_maven(location, &coordinate).await;
        }

        if location.starts_with("http://") || location.starts_with("https://") {
            log::debug!("Downloading {}", location);
            return match self.http.get_bytes(location).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.is_not_found() => Err(ArtifactFetchError::NotFound {
                    location: location.to_string(),
                    tried: vec![location.to_string()],
                }),
                Err(source) => Err(ArtifactFetchError::Http {
                    location: location.to_string(),
                    source,
                }),
            };
        }

        if location.starts_with("file:") {
            let path = url::Url::parse(location)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .ok_or_else(|| ArtifactFetchError::InvalidLocation(location.to_string()))?;
            return read_file(location, &path).await;
        }

        if has_unknown_scheme(location) {
            return Err(ArtifactFetchError::InvalidLocation(location.to_string()));
        }

        let path = PathBuf::from(shellexpand::tilde(location).as_ref());
        read_file(location, &path).await
    }

    async fn load_maven(
        &self,
        location: &str,
        coordinate: &MavenCoordinate,
    ) -> Result<Vec<u8>, ArtifactFetchError> {
        let relative = coordinate.repository_path();
        let mut tried = Vec::new();

        if let Some(local) = &self.config.local_repository {
            let path = local.join(&relative);
            if path.is_file() {
                log::trace!("Found {} in local repository", location);
                return read_file(location, &path).await;
            }
            tried.push(path.display().to_string());
        }

        // Snapshots bypass the download cache
        let cached = self
            .config
            .cache_dir
            .as_ref()
            .filter(|_| !coordinate.is_snapshot())
            .map(|dir| dir.join("maven").join(&relative));
        if let Some(path) = &cached {
            if path.is_file() {
                log::trace!("Cache hit (file): {}", location);
                return read_file(location, path).await;
            }
            tried.push(path.display().to_string());
        }

        let repositories: Vec<String> = match &coordinate.repository {
            Some(repo) => vec![repo.clone()],
            None => self.config.remote_repositories.clone(),
        };

        let mut last_error: Option<HttpError> = None;
        for repository in repositories {
            let url = format!("{}/{}", repository.trim_end_matches('/'), relative);
            tried.push(url.clone());

            let bytes = match self.http.get_optional(&url).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("Failed to download {}: {}", url, e);
                    last_error = Some(e);
                    continue;
                }
            };

            self.verify_remote(location, &url, &bytes).await?;
            log::debug!("Downloaded {} from {}", location, repository);

            if let Some(path) = &cached {
                if let Err(e) = write_cache(path, &bytes).await {
                    log::warn!("Unable to cache {} at {}: {}", location, path.display(), e);
                }
            }
            return Ok(bytes);
        }

        match last_error {
            Some(source) => Err(ArtifactFetchError::Http {
                location: location.to_string(),
                source,
            }),
            None => Err(ArtifactFetchError::NotFound {
                location: location.to_string(),
                tried,
            }),
        }
    }

    /// Check downloaded bytes against the `.sha1` published next to them
    async fn verify_remote(&self, location: &str, url: &str, bytes: &[u8]) -> Result<(), ArtifactFetchError> {
        let checksum_url = format!("{}.{}", url, checksum::ChecksumType::Sha1.extension());
        match self.http.get_optional(&checksum_url).await {
            Ok(Some(content)) => {
                let content = String::from_utf8_lossy(&content);
                match checksum::verify(bytes, &content) {
                    Some(true) => Ok(()),
                    Some(false) => Err(ArtifactFetchError::ChecksumMismatch {
                        location: location.to_string(),
                    }),
                    None => {
                        log::warn!("Ignoring unreadable checksum file {}", checksum_url);
                        Ok(())
                    }
                }
            }
            Ok(None) => {
                log::debug!("No checksum published for {}", url);
                Ok(())
            }
            Err(e) => {
                log::warn!("Unable to fetch checksum {}: {}", checksum_url, e);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ArtifactFetcher for DownloadManager {
    async fn fetch_bytes(&self, location: &str) -> Result<Arc<Vec<u8>>, ArtifactFetchError> {
        if let Some(bytes) = self.artifacts.read().await.get(location) {
            log::trace!("Cache hit (memory): {}", location);
            return Ok(bytes.clone());
        }

        // Get or create a per-location lock to prevent concurrent loads
        let lock = {
            let mut locks = self.loading_locks.write().await;
            locks
                .entry(location.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = lock.lock().await;

        // Another task may have loaded it while we were waiting
        if let Some(bytes) = self.artifacts.read().await.get(location) {
            log::trace!("Cache hit (memory, after lock): {}", location);
            return Ok(bytes.clone());
        }

        let result = self.load(location).await.map(Arc::new);
        if let Ok(bytes) = &result {
            self.artifacts
                .write()
                .await
                .insert(location.to_string(), bytes.clone());
        }

        let mut locks = self.loading_locks.write().await;
        if locks.get(location).is_some_and(|l| Arc::ptr_eq(l, &lock)) {
            locks.remove(location);
        }
        result
    }

    async fn fetch_manifest(&self, location: &str) -> Result<Arc<Manifest>, ArtifactFetchError> {
        if let Some(manifest) = self.manifests.read().await.get(location) {
            return Ok(manifest.clone());
        }

        let manifest = if WrapUrl::is_wrapped(location) {
            let url = WrapUrl::parse(location)?;
            let bytes = self.fetch_bytes(&url.inner).await?;
            self.wrapper.wrap(&url, &bytes)?
        } else {
            let bytes = self.fetch_bytes(location).await?;
            read_manifest(location, &bytes)?
        };

        let manifest = Arc::new(manifest);
        self.manifests
            .write()
            .await
            .insert(location.to_string(), manifest.clone());
        Ok(manifest)
    }
}

async fn read_file(location: &str, path: &Path) -> Result<Vec<u8>, ArtifactFetchError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ArtifactFetchError::NotFound {
            location: location.to_string(),
            tried: vec![path.display().to_string()],
        }),
        Err(source) => Err(ArtifactFetchError::Io {
            location: location.to_string(),
            source,
        }),
    }
}

async fn write_cache(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}

/// `scheme:` prefixes other than a Windows drive letter
fn has_unknown_scheme(location: &str) -> bool {
    match location.split_once(':') {
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::jar;
    use super::*;
    use tempfile::TempDir;

    fn manager(local: Option<&Path>, cache: Option<&Path>) -> DownloadManager {
        DownloadManager::new(
            Arc::new(HttpClient::new().unwrap()),
            DownloadConfig {
                local_repository: local.map(Path::to_path_buf),
                cache_dir: cache.map(Path::to_path_buf),
                remote_repositories: Vec::new(),
                max_concurrent: 4,
            },
        )
    }

    fn install(root: &Path, relative: &str, bytes: &[u8]) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[tokio::test]
    async fn test_fetch_from_local_repository() {
        let local = TempDir::new().unwrap();
        install(
            local.path(),
            "org/example/core/1.0/core-1.0.jar",
            &jar(&[("Bundle-SymbolicName", "org.example.core"), ("Bundle-Version", "1.0")], &[]),
        );

        let manager = manager(Some(local.path()), None);
        let resource = manager.fetch("mvn:org.example/core/1.0").await.unwrap();
        assert_eq!(resource.symbolic_name, "org.example.core");
        assert_eq!(manager.cached_locations().await, vec!["mvn:org.example/core/1.0"]);
    }

    #[tokio::test]
    async fn test_loading_locks_are_released() {
        let local = TempDir::new().unwrap();
        install(
            local.path(),
            "org/example/core/1.0/core-1.0.jar",
            &jar(&[("Bundle-SymbolicName", "org.example.core")], &[]),
        );

        let manager = manager(Some(local.path()), None);
        let (first, second, missing) = tokio::join!(
            manager.fetch_bytes("mvn:org.example/core/1.0"),
            manager.fetch_bytes("mvn:org.example/core/1.0"),
            manager.fetch_bytes("mvn:org.example/missing/1.0"),
        );
        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
        assert!(missing.is_err());
        assert!(manager.loading_locks.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_from_cache_dir() {
        let cache = TempDir::new().unwrap();
        install(
            cache.path(),
            "maven/org/example/util/2.0/util-2.0.jar",
            &jar(&[("Bundle-SymbolicName", "org.example.util")], &[]),
        );

        let manager = manager(None, Some(cache.path()));
        let resource = manager.fetch("mvn:org.example/util/2.0").await.unwrap();
        assert_eq!(resource.symbolic_name, "org.example.util");
    }

    #[tokio::test]
    async fn test_not_found_lists_tried_locations() {
        let local = TempDir::new().unwrap();
        let manager = manager(Some(local.path()), None);

        match manager.fetch_bytes("mvn:org.example/missing/1.0").await {
            Err(ArtifactFetchError::NotFound { location, tried }) => {
                assert_eq!(location, "mvn:org.example/missing/1.0");
                assert_eq!(tried.len(), 1);
                assert!(tried[0].ends_with("missing-1.0.jar"));
            }
            other => panic!("unexpected result {:?}", other.map(|b| b.len())),
        }
    }

    #[tokio::test]
    async fn test_fetch_file_locations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle.jar");
        std::fs::write(&path, jar(&[("Bundle-SymbolicName", "file.bundle")], &[])).unwrap();

        let manager = manager(None, None);
        let url = url::Url::from_file_path(&path).unwrap().to_string();
        assert_eq!(manager.fetch(&url).await.unwrap().symbolic_name, "file.bundle");

        let plain = path.display().to_string();
        assert_eq!(manager.fetch(&plain).await.unwrap().symbolic_name, "file.bundle");
    }

    #[tokio::test]
    async fn test_plain_jar_is_not_a_bundle_unless_wrapped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.jar");
        std::fs::write(&path, jar(&[], &["org/plain/A.class"])).unwrap();
        let location = url::Url::from_file_path(&path).unwrap().to_string();

        let manager = manager(None, None);
        assert!(matches!(
            manager.fetch(&location).await,
            Err(ArtifactFetchError::NotABundle { .. })
        ));

        let wrapped = manager
            .fetch(&format!("wrap:{}$Bundle-SymbolicName=plain", location))
            .await
            .unwrap();
        assert_eq!(wrapped.symbolic_name, "plain");
        assert!(wrapped
            .capabilities
            .iter()
            .any(|c| c.attributes.get("osgi.wiring.package").map(|v| v.to_string()) == Some("org.plain".to_string())));
    }

    struct FixedWrapper;

    impl ArchiveWrapper for FixedWrapper {
        fn wrap(&self, url: &WrapUrl, _bytes: &[u8]) -> Result<Manifest, ArtifactFetchError> {
            let mut headers = indexmap::IndexMap::new();
            headers.insert("Bundle-SymbolicName".to_string(), format!("fixed.{}", url.instructions.len()));
            Ok(Manifest::from_headers(headers))
        }
    }

    #[tokio::test]
    async fn test_custom_wrapper() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.jar");
        std::fs::write(&path, jar(&[], &[])).unwrap();
        let location = url::Url::from_file_path(&path).unwrap().to_string();

        let manager = manager(None, None).with_wrapper(Arc::new(FixedWrapper));
        let wrapped = manager.fetch(&format!("fab:{}", location)).await.unwrap();
        assert_eq!(wrapped.symbolic_name, "fixed.0");
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_load() {
        let local = TempDir::new().unwrap();
        install(
            local.path(),
            "org/example/core/1.0/core-1.0.jar",
            &jar(&[("Bundle-SymbolicName", "org.example.core")], &[]),
        );
        let manager = manager(Some(local.path()), None);

        let (a, b) = tokio::join!(
            manager.fetch_bytes("mvn:org.example/core/1.0"),
            manager.fetch_bytes("mvn:org.example/core/1.0")
        );
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    }

    #[tokio::test]
    async fn test_invalid_locations() {
        let manager = manager(None, None);
        assert!(matches!(
            manager.fetch_bytes("mvn:org.example").await,
            Err(ArtifactFetchError::InvalidLocation(_))
        ));
        assert!(matches!(
            manager.fetch_bytes("ftp://example.org/a.jar").await,
            Err(ArtifactFetchError::InvalidLocation(_))
        ));
    }

    #[test]
    fn test_unknown_scheme_detection() {
        assert!(has_unknown_scheme("ftp://x"));
        assert!(!has_unknown_scheme("C:\\bundles\\a.jar"));
        assert!(!has_unknown_scheme("/tmp/a.jar"));
    }
}
