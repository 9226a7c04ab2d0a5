//! Run configuration.
//!
//! Values come, lowest priority first, from built-in defaults, a `featgate.toml`
//! file, `FEATGATE_*` environment variables and command line flags. Merging
//! files and flags is up to the caller; this module owns the defaults and the
//! environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregator::FailurePolicy;
use crate::downloader::{DownloadConfig, DEFAULT_MAX_CONCURRENT, MAVEN_CENTRAL};
use crate::error::{Result, VerifyError};
use crate::http::HttpClientConfig;
use crate::runtime::DEFAULT_DISTRIBUTION;

pub const ENV_CACHE_DIR: &str = "FEATGATE_CACHE_DIR";
pub const ENV_LOCAL_REPOSITORY: &str = "FEATGATE_LOCAL_REPOSITORY";
pub const ENV_MAVEN_REPOSITORIES: &str = "FEATGATE_MAVEN_REPOSITORIES";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;
const DEFAULT_HTTP_RETRIES: u32 = 3;

/// Everything a verification run needs to know
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct VerifyConfig {
    /// Features descriptor URIs to load
    pub descriptors: Vec<String>,
    /// Selection tokens over `name/version`
    pub features: Vec<String>,
    /// Features deployed alongside every verified feature
    pub framework: Vec<String>,
    /// Base distribution the runtime environment is synthesized from
    pub distribution: String,
    pub javase: Option<String>,
    pub dist_dir: Option<String>,
    /// Java properties file merged into the global properties
    pub additional_metadata: Option<PathBuf>,
    pub fail: FailurePolicy,
    pub verify_transitive: bool,

    pub maven_repositories: Vec<String>,
    pub local_repository: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub max_concurrent_downloads: usize,
    pub http_timeout_secs: u64,
    pub http_retries: u32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            descriptors: Vec::new(),
            features: Vec::new(),
            framework: Vec::new(),
            distribution: DEFAULT_DISTRIBUTION.to_string(),
            javase: None,
            dist_dir: None,
            additional_metadata: None,
            fail: FailurePolicy::default(),
            verify_transitive: false,
            maven_repositories: vec![MAVEN_CENTRAL.to_string()],
            local_repository: None,
            cache_dir: None,
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            http_retries: DEFAULT_HTTP_RETRIES,
        }
    }
}

impl VerifyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `FEATGATE_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply environment overrides read through `lookup`
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(cache_dir) = non_empty(ENV_CACHE_DIR) {
            self.cache_dir = Some(PathBuf::from(cache_dir));
        }
        if let Some(local) = non_empty(ENV_LOCAL_REPOSITORY) {
            self.local_repository = Some(PathBuf::from(local));
        }
        if let Some(repositories) = non_empty(ENV_MAVEN_REPOSITORIES) {
            self.maven_repositories = repositories
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    /// Reject configurations that cannot run
    pub fn validate(&self) -> Result<()> {
        if self.descriptors.iter().all(|d| d.trim().is_empty()) {
            return Err(VerifyError::Config("at least one descriptor is required".to_string()));
        }
        if self.distribution.trim().is_empty() {
            return Err(VerifyError::Config("distribution must not be empty".to_string()));
        }
        if self.max_concurrent_downloads == 0 {
            return Err(VerifyError::Config(
                "max-concurrent-downloads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Local Maven repository, `~/.m2/repository` unless configured
    pub fn local_repository_path(&self) -> Option<PathBuf> {
        match &self.local_repository {
            Some(path) => Some(expand(path)),
            None => directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".m2").join("repository")),
        }
    }

    /// Download cache, the platform cache directory unless configured
    pub fn cache_dir_path(&self) -> Option<PathBuf> {
        match &self.cache_dir {
            Some(path) => Some(expand(path)),
            None => directories::ProjectDirs::from("", "", "featgate").map(|dirs| dirs.cache_dir().to_path_buf()),
        }
    }

    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig {
            local_repository: self.local_repository_path(),
            cache_dir: self.cache_dir_path(),
            remote_repositories: self.maven_repositories.clone(),
            max_concurrent: self.max_concurrent_downloads,
        }
    }

    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig::new()
            .with_timeout(Duration::from_secs(self.http_timeout_secs))
            .with_max_retries(self.http_retries)
    }
}

fn expand(path: &std::path::Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).as_ref())
}
