use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use featgate_version::VersionRange;
use indexmap::IndexMap;

use super::DeploymentRequest;
use crate::downloader::{fetch_all, ArtifactFetcher, WrapUrl, DEFAULT_MAX_CONCURRENT};
use crate::error::{ArtifactFetchError, FailureCause, ResolverError};
use crate::feature::{version_constraint, Feature, FeatureId, DEFAULT_VERSION};
use crate::repository::RepositoryManager;
use crate::resource::{Manifest, Resource, ResourceBuilder};
use crate::solver::ResourceSet;

/// Expanded features; the flag marks features only pulled in on demand
type ExpandedFeatures = IndexMap<FeatureId, (Arc<Feature>, bool)>;

/// Turns a [`DeploymentRequest`] into the [`ResourceSet`] handed to the resolver
///
/// Artifacts are fetched concurrently. Every location fetched successfully is
/// recorded, also when building fails, for diagnostics.
pub struct DeploymentBuilder<'a> {
    fetcher: &'a dyn ArtifactFetcher,
    repositories: &'a RepositoryManager,
    max_concurrent: usize,
    fetched: BTreeSet<String>,
}

impl<'a> DeploymentBuilder<'a> {
    pub fn new(fetcher: &'a dyn ArtifactFetcher, repositories: &'a RepositoryManager) -> Self {
        Self {
            fetcher,
            repositories,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            fetched: BTreeSet::new(),
        }
    }

    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Locations fetched so far, sorted
    pub fn fetched(&self) -> &BTreeSet<String> {
        &self.fetched
    }

    pub fn into_fetched(self) -> BTreeSet<String> {
        self.fetched
    }

    pub async fn build(&mut self, request: &DeploymentRequest) -> Result<ResourceSet, FailureCause> {
        let features = self.expand_features(request).map_err(FailureCause::Resolve)?;

        let mut locations: IndexMap<String, bool> = IndexMap::new();
        let mut add = |location: &str, optional: bool| {
            locations
                .entry(location.to_string())
                .and_modify(|o| *o = *o && optional)
                .or_insert(optional);
        };

        for (feature, optional) in features.values() {
            for bundle in &feature.bundles {
                add(&bundle.location, *optional || bundle.dependency);
            }
            for conditional in &feature.conditionals {
                let mut met = true;
                for condition in &conditional.condition {
                    met &= is_condition_met(condition, &features).map_err(FailureCause::Resolve)?;
                }
                if met {
                    for bundle in &conditional.bundles {
                        add(&bundle.location, *optional || bundle.dependency);
                    }
                }
            }
        }
        for location in &request.bundles {
            add(location, false);
        }
        for location in &request.fabs {
            if WrapUrl::is_wrapped(location) {
                add(location, false);
            } else {
                add(&format!("fab:{}", location), false);
            }
        }
        for location in &request.optionals {
            add(location, true);
        }

        log::debug!(
            "Deploying {} features and {} artifacts",
            features.len(),
            locations.len()
        );

        let overlay = MetadataOverlay {
            inner: self.fetcher,
            metadata: &request.metadata,
        };

        let mut resources = ResourceSet::new();
        let results = fetch_all(&overlay, locations.keys().cloned(), self.max_concurrent).await;
        let fetched = self.record(results).map_err(FailureCause::Fetch)?;
        for (location, resource) in fetched {
            if locations.get(&location).copied().unwrap_or(false) {
                resources.optional.push(resource);
            } else {
                resources.mandatory.push(resource);
            }
        }

        if !request.overrides.is_empty() {
            let results = fetch_all(&overlay, request.overrides.iter().cloned(), self.max_concurrent).await;
            let overrides: Vec<Arc<Resource>> = self
                .record(results)
                .map_err(FailureCause::Fetch)?
                .into_iter()
                .map(|(_, resource)| resource)
                .collect();
            apply_overrides(&mut resources.mandatory, &overrides);
            apply_overrides(&mut resources.optional, &overrides);
        }

        for uri in &request.resource_repositories {
            let repository = self.load_resource_repository(uri).await.map_err(FailureCause::Fetch)?;
            resources.optional.extend(repository);
        }

        for (feature, optional) in features.values() {
            let resource = ResourceBuilder::build_feature(feature).map_err(|e| {
                FailureCause::Resolve(ResolverError::InvalidResource {
                    resource: feature.id().to_string(),
                    reason: e.to_string(),
                })
            })?;
            if *optional {
                resources.optional.push(Arc::new(resource));
            } else {
                resources.mandatory.push(Arc::new(resource));
            }
        }

        for raw in &request.requirements {
            let requirements = ResourceBuilder::requirements(raw).map_err(|e| {
                FailureCause::Resolve(ResolverError::InvalidRequirement {
                    requirement: raw.clone(),
                    reason: e.to_string(),
                })
            })?;
            resources.requirements.extend(requirements);
        }

        Ok(resources)
    }

    /// Record successful fetches; the first failure in input order wins
    fn record(
        &mut self,
        results: Vec<(String, Result<Arc<Resource>, ArtifactFetchError>)>,
    ) -> Result<Vec<(String, Arc<Resource>)>, ArtifactFetchError> {
        let mut resources = Vec::with_capacity(results.len());
        let mut first_error = None;

        for (location, result) in results {
            match result {
                Ok(resource) => {
                    self.fetched.insert(location.clone());
                    resources.push((location, resource));
                }
                Err(e) => {
                    log::debug!("Unable to fetch {}: {}", location, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(resources),
        }
    }

    /// Requested features plus everything they depend on
    fn expand_features(&self, request: &DeploymentRequest) -> Result<ExpandedFeatures, ResolverError> {
        let mut queue: VecDeque<(Arc<Feature>, bool)> = VecDeque::new();
        for requested in &request.features {
            let (name, version) = match requested.split_once('/') {
                Some((name, version)) => (name.trim(), Some(version.trim())),
                None => (requested.trim(), None),
            };
            // A full identity names exactly one feature, never a sibling version
            let exact = version.and_then(|v| self.repositories.find_exact(name, v));
            let feature = match exact {
                Some(feature) => feature,
                None => self.find_feature(name, version)?,
            };
            queue.push_back((feature, false));
        }

        let mut expanded = ExpandedFeatures::new();
        while let Some((feature, optional)) = queue.pop_front() {
            let id = feature.id();
            match expanded.get_mut(&id) {
                Some(entry) if entry.1 && !optional => entry.1 = false,
                Some(_) => continue,
                None => {
                    expanded.insert(id, (Arc::clone(&feature), optional));
                }
            }

            for dependency in &feature.dependencies {
                let found = self.find_feature(&dependency.name, dependency.version.as_deref())?;
                queue.push_back((found, optional || dependency.dependency));
            }
        }

        Ok(expanded)
    }

    fn find_feature(&self, name: &str, version: Option<&str>) -> Result<Arc<Feature>, ResolverError> {
        let constraint = constraint(name, version)?;
        self.repositories
            .find_feature(name, constraint.as_ref())
            .ok_or_else(|| ResolverError::FeatureNotFound {
                name: name.to_string(),
                version: version.unwrap_or(DEFAULT_VERSION).to_string(),
            })
    }

    /// Resources described by a JSON document mapping locations to manifest headers
    async fn load_resource_repository(&mut self, uri: &str) -> Result<Vec<Arc<Resource>>, ArtifactFetchError> {
        let bytes = self.fetcher.fetch_bytes(uri).await?;
        let entries: IndexMap<String, IndexMap<String, String>> =
            serde_json::from_slice(&bytes).map_err(|e| ArtifactFetchError::Manifest {
                location: uri.to_string(),
                reason: e.to_string(),
            })?;
        self.fetched.insert(uri.to_string());

        entries
            .into_iter()
            .map(|(location, headers)| {
                ResourceBuilder::build(&location, &Manifest::from_headers(headers))
                    .map(Arc::new)
                    .map_err(|e| ArtifactFetchError::Manifest {
                        location: format!("{}#{}", uri, location),
                        reason: e.to_string(),
                    })
            })
            .collect()
    }
}

/// Version constraint of a feature reference
fn constraint(name: &str, version: Option<&str>) -> Result<Option<VersionRange>, ResolverError> {
    version_constraint(version).map_err(|e| ResolverError::InvalidRequirement {
        requirement: format!("{}/{}", name, version.unwrap_or_default()),
        reason: e.to_string(),
    })
}

/// Whether a conditional's condition (`name[/version]`) names a deployed feature
fn is_condition_met(condition: &str, features: &ExpandedFeatures) -> Result<bool, ResolverError> {
    let (name, version) = match condition.split_once('/') {
        Some((name, version)) => (name.trim(), Some(version.trim())),
        None => (condition.trim(), None),
    };
    let constraint = constraint(name, version)?;
    Ok(features.values().any(|(feature, _)| {
        feature.name == name
            && constraint
                .as_ref()
                .map(|c| c.includes(&feature.parsed_version()))
                .unwrap_or(true)
    }))
}

/// Replace bundles by a newer override of the same `major.minor` line
fn apply_overrides(resources: &mut [Arc<Resource>], overrides: &[Arc<Resource>]) {
    for resource in resources.iter_mut() {
        let replacement = overrides
            .iter()
            .filter(|o| {
                o.symbolic_name == resource.symbolic_name
                    && o.version > resource.version
                    && o.version.major == resource.version.major
                    && o.version.minor == resource.version.minor
            })
            .max_by(|a, b| a.version.cmp(&b.version));

        if let Some(replacement) = replacement {
            log::info!("Overriding {} with {}", resource, replacement);
            *resource = Arc::clone(replacement);
        }
    }
}

/// Applies `metadata#` headers on top of fetched manifests
struct MetadataOverlay<'a> {
    inner: &'a dyn ArtifactFetcher,
    metadata: &'a IndexMap<String, IndexMap<String, String>>,
}

#[async_trait]
impl<'a> ArtifactFetcher for MetadataOverlay<'a> {
    async fn fetch_bytes(&self, location: &str) -> Result<Arc<Vec<u8>>, ArtifactFetchError> {
        self.inner.fetch_bytes(location).await
    }

    async fn fetch_manifest(&self, location: &str) -> Result<Arc<Manifest>, ArtifactFetchError> {
        let manifest = self.inner.fetch_manifest(location).await;
        let Some(headers) = self.metadata.get(location) else {
            return manifest;
        };

        let mut manifest = match manifest {
            Ok(manifest) => manifest.as_ref().clone(),
            Err(ArtifactFetchError::NotABundle { .. }) => Manifest::new(),
            Err(e) => return Err(e),
        };
        for (name, value) in headers {
            manifest.insert(name.clone(), value.clone());
        }
        Ok(Arc::new(manifest))
    }
}
