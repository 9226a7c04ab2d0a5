//! What gets deployed when verifying one feature.

mod builder;

pub use builder::DeploymentBuilder;

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::feature::FeatureId;
use crate::properties::Properties;

pub const FEATURE_PREFIX: &str = "feature.";
pub const BUNDLE_PREFIX: &str = "bundle.";
pub const FAB_PREFIX: &str = "fab.";
pub const REQUIREMENT_PREFIX: &str = "req.";
pub const OVERRIDE_PREFIX: &str = "override.";
pub const OPTIONAL_PREFIX: &str = "optional.";
pub const RESOURCES_PREFIX: &str = "resources.";
pub const METADATA_PREFIX: &str = "metadata#";
pub const RESOLVE_OPTIONAL_IMPORTS: &str = "resolve.optional.imports";

/// Everything requested for a single verification
///
/// Derived from the global properties plus the feature under test; the
/// global properties themselves are never modified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentRequest {
    /// Required features as `name[/version]`
    pub features: BTreeSet<String>,
    pub bundles: BTreeSet<String>,
    pub fabs: BTreeSet<String>,
    /// Raw requirement clauses
    pub requirements: BTreeSet<String>,
    pub overrides: BTreeSet<String>,
    /// Candidates pulled in only when needed
    pub optionals: BTreeSet<String>,
    /// location -> header -> value
    pub metadata: IndexMap<String, IndexMap<String, String>>,
    pub resource_repositories: BTreeSet<String>,
    pub resolve_optional_imports: bool,
}

impl DeploymentRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Partition `properties` by prefix and add the feature under test
    pub fn from_properties(feature: &FeatureId, properties: &Properties) -> Self {
        let mut request = Self {
            features: prefixed(properties, FEATURE_PREFIX),
            bundles: prefixed(properties, BUNDLE_PREFIX),
            fabs: prefixed(properties, FAB_PREFIX),
            requirements: prefixed(properties, REQUIREMENT_PREFIX),
            overrides: prefixed(properties, OVERRIDE_PREFIX),
            optionals: prefixed(properties, OPTIONAL_PREFIX),
            metadata: metadata(properties),
            resource_repositories: prefixed(properties, RESOURCES_PREFIX),
            resolve_optional_imports: properties
                .get(RESOLVE_OPTIONAL_IMPORTS)
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        };
        request.features.insert(feature.to_string());
        request
    }

    /// Add a required feature (builder style)
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.insert(feature.into());
        self
    }

    /// Add a required bundle (builder style)
    pub fn with_bundle(mut self, location: impl Into<String>) -> Self {
        self.bundles.insert(location.into());
        self
    }
}

/// Values of every property under `prefix`; an empty value stands for the key suffix
fn prefixed(properties: &Properties, prefix: &str) -> BTreeSet<String> {
    properties
        .iter()
        .filter_map(|(key, value)| {
            let suffix = key.strip_prefix(prefix)?;
            let value = value.trim();
            Some(if value.is_empty() { suffix } else { value }.to_string())
        })
        .filter(|v| !v.is_empty())
        .collect()
}

/// `metadata#<location>#<header> = <value>` entries
fn metadata(properties: &Properties) -> IndexMap<String, IndexMap<String, String>> {
    let mut result: IndexMap<String, IndexMap<String, String>> = IndexMap::new();
    for (key, value) in properties.iter() {
        let Some(rest) = key.strip_prefix(METADATA_PREFIX) else {
            continue;
        };
        let parts: Vec<&str> = rest.split('#').collect();
        if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
            log::warn!("Ignoring malformed metadata property {}", key);
            continue;
        }

        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        result
            .entry(parts[0].to_string())
            .or_default()
            .insert(parts[1].to_string(), value.to_string());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(entries: &[(&str, &str)]) -> Properties {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_partition_by_prefix() {
        let props = properties(&[
            ("feature.framework.base", "base"),
            ("bundle.extra", "mvn:org.example/extra/1.0"),
            ("fab.legacy", "mvn:org.example/legacy/1.0"),
            ("req.ee", "osgi.ee;filter:=\"(osgi.ee=JavaSE)\""),
            ("override.core", "mvn:org.example/core/1.0.1"),
            ("optional.util", "mvn:org.example/util/1.0"),
            ("resources.repo", "file:/tmp/resources.json"),
            ("javase", "1.8"),
        ]);
        let request = DeploymentRequest::from_properties(&FeatureId::new("core", "1.0"), &props);

        assert_eq!(
            request.features,
            ["base".to_string(), "core/1.0".to_string()].into_iter().collect()
        );
        assert!(request.bundles.contains("mvn:org.example/extra/1.0"));
        assert!(request.fabs.contains("mvn:org.example/legacy/1.0"));
        assert_eq!(request.requirements.len(), 1);
        assert!(request.overrides.contains("mvn:org.example/core/1.0.1"));
        assert!(request.optionals.contains("mvn:org.example/util/1.0"));
        assert!(request.resource_repositories.contains("file:/tmp/resources.json"));
        assert!(!request.resolve_optional_imports);
    }

    #[test]
    fn test_empty_value_uses_key_suffix() {
        let props = properties(&[("bundle.mvn:org.example/extra/1.0", "")]);
        let request = DeploymentRequest::from_properties(&FeatureId::new("core", "1.0"), &props);
        assert!(request.bundles.contains("mvn:org.example/extra/1.0"));
    }

    #[test]
    fn test_metadata_entries() {
        let props = properties(&[
            ("metadata#mvn:org.example/plain/1.0#Bundle-SymbolicName", "\"org.example.plain\""),
            ("metadata#mvn:org.example/plain/1.0#Export-Package", "org.example.plain"),
            ("metadata#broken", "x"),
            ("metadata#a#b#c", "x"),
        ]);
        let request = DeploymentRequest::from_properties(&FeatureId::new("core", "1.0"), &props);

        assert_eq!(request.metadata.len(), 1);
        let headers = &request.metadata["mvn:org.example/plain/1.0"];
        assert_eq!(headers["Bundle-SymbolicName"], "org.example.plain");
        assert_eq!(headers["Export-Package"], "org.example.plain");
    }

    #[test]
    fn test_resolve_optional_imports_flag() {
        let props = properties(&[(RESOLVE_OPTIONAL_IMPORTS, "TRUE")]);
        let request = DeploymentRequest::from_properties(&FeatureId::new("core", "1.0"), &props);
        assert!(request.resolve_optional_imports);
    }

    #[test]
    fn test_global_properties_are_untouched() {
        let props = properties(&[("feature.base", "base")]);
        let before = props.clone();
        let _ = DeploymentRequest::from_properties(&FeatureId::new("core", "1.0"), &props);
        let second = DeploymentRequest::from_properties(&FeatureId::new("web", "2.0"), &props);
        assert_eq!(props, before);
        assert!(!second.features.contains("core/1.0"));
    }
}
