//! Verification of a single feature.

use std::sync::Arc;

use crate::deployment::{DeploymentBuilder, DeploymentRequest};
use crate::downloader::{ArtifactFetcher, DEFAULT_MAX_CONCURRENT};
use crate::error::{FailureCause, FeatureResolutionError};
use crate::feature::{Feature, FeatureId};
use crate::properties::Properties;
use crate::repository::RepositoryManager;
use crate::resource::Resource;
use crate::runtime::RuntimeEnvironment;
use crate::solver::{CapabilityResolver, Resolver};

/// A feature that resolved
#[derive(Debug, Clone)]
pub struct Resolution {
    pub feature: FeatureId,
    /// Resources selected by the resolver, runtime excluded
    pub resources: Vec<Arc<Resource>>,
}

pub type ResolutionOutcome = Result<Resolution, FeatureResolutionError>;

/// Checks that one feature resolves against the runtime environment
pub struct ResolutionVerifier {
    fetcher: Arc<dyn ArtifactFetcher>,
    resolver: Arc<dyn Resolver>,
    max_concurrent: usize,
}

impl ResolutionVerifier {
    pub fn new(fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self {
            fetcher,
            resolver: Arc::new(CapabilityResolver::new()),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Resolve `feature` together with everything the global properties request
    pub async fn verify(
        &self,
        feature: &Feature,
        repositories: &RepositoryManager,
        runtime: &RuntimeEnvironment,
        properties: &Properties,
    ) -> ResolutionOutcome {
        let id = feature.id();
        let request = DeploymentRequest::from_properties(&id, properties);
        log::debug!("Verifying feature {}", id);

        let mut builder =
            DeploymentBuilder::new(self.fetcher.as_ref(), repositories).max_concurrent(self.max_concurrent);
        let result = match builder.build(&request).await {
            Ok(resources) => self
                .resolver
                .resolve(runtime.resource(), &resources, request.resolve_optional_imports)
                .map_err(FailureCause::Resolve),
            Err(cause) => Err(cause),
        };

        match result {
            Ok(resources) => {
                log::debug!("Feature {} resolved to {} resources", id, resources.len());
                Ok(Resolution {
                    feature: id,
                    resources,
                })
            }
            Err(cause) => Err(FeatureResolutionError::new(
                id,
                cause,
                repositories.uris(),
                builder.into_fetched(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::test_support::jar;
    use crate::downloader::MemoryFetcher;
    use crate::repository::{Repository, RepositoryMap};

    fn runtime(exports: &str) -> RuntimeEnvironment {
        let mut properties = Properties::new();
        properties.insert("org.osgi.framework.system.packages", exports);
        RuntimeEnvironment::from_properties(properties).unwrap()
    }

    fn setup() -> (MemoryFetcher, RepositoryManager, Feature) {
        let feature = Feature::new("core", "1.0").with_bundle("mvn:org.example/core/1.0");
        let fetcher = MemoryFetcher::new().with_artifact(
            "mvn:org.example/core/1.0",
            jar(
                &[
                    ("Bundle-SymbolicName", "org.example.core"),
                    ("Import-Package", "org.osgi.framework, org.example.missing"),
                ],
                &[],
            ),
        );
        let mut map = RepositoryMap::new();
        map.insert(
            "file:/r1.json".to_string(),
            Arc::new(Repository::new("file:/r1.json").with_feature(feature.clone())),
        );
        (fetcher, RepositoryManager::new(map), feature)
    }

    #[tokio::test]
    async fn test_missing_package_fails() {
        let (fetcher, repositories, feature) = setup();
        let verifier = ResolutionVerifier::new(Arc::new(fetcher));

        let err = verifier
            .verify(&feature, &repositories, &runtime("org.osgi.framework"), &Properties::new())
            .await
            .unwrap_err();

        assert!(err.is_resolution_failure());
        assert_eq!(err.feature, FeatureId::new("core", "1.0"));
        assert!(err.repositories.contains("file:/r1.json"));
        assert!(err.resources.contains("mvn:org.example/core/1.0"));
        assert!(err.to_string().starts_with("Feature resolution failed for core/1.0"));
    }

    #[tokio::test]
    async fn test_unversioned_feature_is_verified_itself() {
        let broken = Feature::new("core", "0.0.0").with_bundle("mvn:org.example/broken/1.0");
        let fetcher = MemoryFetcher::new()
            .with_artifact(
                "mvn:org.example/broken/1.0",
                jar(
                    &[
                        ("Bundle-SymbolicName", "org.example.broken"),
                        ("Import-Package", "org.absent"),
                    ],
                    &[],
                ),
            )
            .with_artifact(
                "mvn:org.example/good/1.0",
                jar(&[("Bundle-SymbolicName", "org.example.good")], &[]),
            );
        let mut map = RepositoryMap::new();
        map.insert(
            "file:/r1.json".to_string(),
            Arc::new(
                Repository::new("file:/r1.json")
                    .with_feature(broken.clone())
                    .with_feature(Feature::new("core", "2.0").with_bundle("mvn:org.example/good/1.0")),
            ),
        );

        let err = ResolutionVerifier::new(Arc::new(fetcher))
            .verify(
                &broken,
                &RepositoryManager::new(map),
                &runtime("org.osgi.framework"),
                &Properties::new(),
            )
            .await
            .unwrap_err();
        assert!(err.is_resolution_failure());
        assert_eq!(err.feature, FeatureId::new("core", "0.0.0"));
        assert!(!err.resources.contains("mvn:org.example/good/1.0"));
    }

    #[tokio::test]
    async fn test_package_provided_by_runtime_succeeds() {
        let (fetcher, repositories, feature) = setup();
        let verifier = ResolutionVerifier::new(Arc::new(fetcher));

        let resolution = verifier
            .verify(
                &feature,
                &repositories,
                &runtime("org.osgi.framework, org.example.missing"),
                &Properties::new(),
            )
            .await
            .unwrap();
        assert_eq!(resolution.feature.to_string(), "core/1.0");
        assert!(resolution.resources.iter().any(|r| r.symbolic_name == "org.example.core"));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_not_a_resolution_failure() {
        let (_, repositories, feature) = setup();
        let verifier = ResolutionVerifier::new(Arc::new(MemoryFetcher::new()));

        let err = verifier
            .verify(&feature, &repositories, &runtime("org.osgi.framework"), &Properties::new())
            .await
            .unwrap_err();
        assert!(!err.is_resolution_failure());
        assert!(err.resources.is_empty());
        assert!(err.to_string().starts_with("Error verifying feature core/1.0"));
    }

    #[tokio::test]
    async fn test_global_bundles_are_deployed() {
        let (fetcher, repositories, feature) = setup();
        let fetcher = fetcher.with_artifact(
            "mvn:org.example/provider/1.0",
            jar(
                &[
                    ("Bundle-SymbolicName", "org.example.provider"),
                    ("Export-Package", "org.example.missing"),
                ],
                &[],
            ),
        );
        let mut properties = Properties::new();
        properties.insert("bundle.provider", "mvn:org.example/provider/1.0");

        let resolution = ResolutionVerifier::new(Arc::new(fetcher))
            .verify(&feature, &repositories, &runtime("org.osgi.framework"), &properties)
            .await
            .unwrap();
        assert!(resolution.resources.len() >= 2);
    }
}
