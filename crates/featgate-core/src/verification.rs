//! A complete verification run.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::aggregator::FailureAggregator;
use crate::config::VerifyConfig;
use crate::downloader::{ArtifactFetcher, DownloadManager};
use crate::error::{Result, VerifyError};
use crate::feature::{Feature, FeatureId};
use crate::http::HttpClient;
use crate::properties::Properties;
use crate::report::Reporter;
use crate::repository::{load_repositories, DescriptorLoader, RepositoryManager};
use crate::runtime::RuntimeEnvironmentBuilder;
use crate::selector::{select_features, SelectionPattern};
use crate::solver::{CapabilityResolver, Resolver};
use crate::verifier::ResolutionVerifier;

const FRAMEWORK_PREFIX: &str = "feature.framework.";

/// Result of a run in which every selected feature resolved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Verified features, in verification order
    pub verified: Vec<FeatureId>,
    /// Every repository loaded, sorted
    pub repositories: BTreeSet<String>,
}

/// Loaded repositories plus the features selected from them
#[derive(Debug, Clone)]
pub struct Selection {
    pub repositories: RepositoryManager,
    pub features: Vec<Arc<Feature>>,
}

/// Loads descriptors, selects features and verifies each of them
pub struct FeatureVerification {
    config: VerifyConfig,
    fetcher: Option<Arc<dyn ArtifactFetcher>>,
    resolver: Arc<dyn Resolver>,
    reporter: Reporter,
}

impl FeatureVerification {
    pub fn new(config: VerifyConfig) -> Self {
        Self {
            config,
            fetcher: None,
            resolver: Arc::new(CapabilityResolver::new()),
            reporter: Reporter::new(),
        }
    }

    /// Use `fetcher` instead of a [`DownloadManager`] built from the configuration
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    fn fetcher(&self) -> Result<Arc<dyn ArtifactFetcher>> {
        if let Some(fetcher) = &self.fetcher {
            return Ok(Arc::clone(fetcher));
        }
        let http = HttpClient::with_config(self.config.http_config())
            .map_err(|e| VerifyError::Config(format!("unable to create HTTP client: {}", e)))?;
        Ok(Arc::new(DownloadManager::new(
            Arc::new(http),
            self.config.download_config(),
        )))
    }

    /// Additional metadata plus one required feature per framework entry
    pub fn global_properties(&self) -> Result<Properties> {
        let mut properties = match &self.config.additional_metadata {
            Some(path) => Properties::load(path).map_err(|source| VerifyError::AdditionalMetadata {
                path: path.clone(),
                source,
            })?,
            None => Properties::new(),
        };

        for framework in &self.config.framework {
            properties.insert(format!("{}{}", FRAMEWORK_PREFIX, framework), framework.clone());
        }
        Ok(properties)
    }

    /// Load every descriptor and select the candidate features
    pub async fn select(&self) -> Result<Selection> {
        self.config.validate()?;
        let fetcher = self.fetcher()?;
        self.select_with(&fetcher).await
    }

    async fn select_with(&self, fetcher: &Arc<dyn ArtifactFetcher>) -> Result<Selection> {
        self.reporter.phase("Loading features descriptors");
        let loader = DescriptorLoader::new(Arc::clone(fetcher));
        let repositories = load_repositories(&loader, &self.config.descriptors).await?;

        let pattern = SelectionPattern::parse(&self.config.features)?;
        let features = select_features(
            &repositories,
            &self.config.descriptors,
            self.config.verify_transitive,
            pattern.as_ref(),
        );

        Ok(Selection {
            repositories: RepositoryManager::new(repositories),
            features,
        })
    }

    /// Verify every selected feature under the configured failure policy
    pub async fn run(&self) -> Result<RunSummary> {
        self.config.validate()?;
        let fetcher = self.fetcher()?;
        let properties = self.global_properties()?;
        let Selection { repositories, features } = self.select_with(&fetcher).await?;

        let mut summary = RunSummary {
            verified: Vec::new(),
            repositories: repositories.uris(),
        };
        if features.is_empty() {
            log::warn!("No feature matches the selection");
            self.reporter.summary(0, 0);
            return Ok(summary);
        }

        self.reporter
            .phase(&format!("Synthesizing runtime environment from {}", self.config.distribution));
        let runtime = RuntimeEnvironmentBuilder::new(self.config.distribution.clone())
            .dist_dir(self.config.dist_dir.clone())
            .javase(self.config.javase.clone())
            .global_properties(&properties)
            .build(fetcher.as_ref())
            .await?;
        log::info!(
            "Verifying {} feature(s) against {} (Java {})",
            features.len(),
            self.config.distribution,
            runtime.java_specification_version()
        );

        let verifier = ResolutionVerifier::new(Arc::clone(&fetcher))
            .with_resolver(Arc::clone(&self.resolver))
            .with_max_concurrent(self.config.max_concurrent_downloads);
        let mut aggregator = FailureAggregator::new(self.config.fail);

        for feature in &features {
            let outcome = verifier.verify(feature, &repositories, &runtime, &properties).await;
            match &outcome {
                Ok(resolution) => self.reporter.success(&resolution.feature),
                Err(failure) => self.reporter.failure(failure),
            }

            match aggregator.record(outcome) {
                Ok(Some(resolution)) => summary.verified.push(resolution.feature),
                Ok(None) => {}
                Err(failure) => {
                    self.reporter.summary(aggregator.passed(), 1);
                    return Err(failure.into());
                }
            }
        }

        self.reporter
            .summary(aggregator.passed(), aggregator.failures().len());
        match aggregator.finish() {
            Ok(_) => Ok(summary),
            Err(aggregate) => {
                self.reporter.aggregate(&aggregate);
                Err(aggregate.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_framework_properties() {
        let mut config = VerifyConfig::default();
        config.framework = vec!["framework".to_string(), "scr".to_string()];
        let properties = FeatureVerification::new(config).global_properties().unwrap();

        assert_eq!(properties.get("feature.framework.framework"), Some("framework"));
        assert_eq!(properties.get("feature.framework.scr"), Some("scr"));
    }

    #[test]
    fn test_additional_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.properties");
        std::fs::write(&path, "javase=1.8\nbundle.extra=mvn:org.example/extra/1.0\n").unwrap();

        let mut config = VerifyConfig::default();
        config.additional_metadata = Some(path);
        let properties = FeatureVerification::new(config).global_properties().unwrap();
        assert_eq!(properties.get("javase"), Some("1.8"));
        assert_eq!(properties.len(), 2);
    }

    #[test]
    fn test_missing_additional_metadata_is_fatal() {
        let mut config = VerifyConfig::default();
        config.additional_metadata = Some(PathBuf::from("/nonexistent/metadata.properties"));
        let err = FeatureVerification::new(config).global_properties().unwrap_err();
        assert!(matches!(err, VerifyError::AdditionalMetadata { .. }));
        assert!(!err.is_verification_failure());
    }

    #[tokio::test]
    async fn test_run_requires_descriptors() {
        let err = FeatureVerification::new(VerifyConfig::default()).run().await.unwrap_err();
        assert!(matches!(err, VerifyError::Config(_)));
    }
}
