//! Feature model.
//!
//! A feature is a named, versioned set of bundles, feature dependencies and
//! configuration that is meant to be installed together.

mod descriptor;

pub use descriptor::{
    BundleEntry, ConditionalEntry, ConfigFileEntry, DependencyEntry, FeatureEntry,
    FeaturesDescriptor,
};

use std::fmt;

use featgate_version::{Version, VersionError, VersionRange};
use indexmap::IndexMap;

/// Version assumed for features and feature references that declare none
pub const DEFAULT_VERSION: &str = "0.0.0";

/// Identity of a feature: `name/version`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId {
    pub name: String,
    pub version: String,
}

impl FeatureId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Parse `name` or `name/version`
    pub fn parse(id: &str) -> Self {
        match id.split_once('/') {
            Some((name, version)) => Self::new(name.trim(), version.trim()),
            None => Self::new(id.trim(), DEFAULT_VERSION),
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// A bundle referenced by a feature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfo {
    pub location: String,
    pub start_level: Option<u32>,
    /// Dependency bundles are only installed when something requires them
    pub dependency: bool,
}

impl BundleInfo {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            start_level: None,
            dependency: false,
        }
    }
}

/// A reference from one feature to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    /// Exact version or range; `None` selects the highest available version
    pub version: Option<String>,
    pub prerequisite: bool,
    pub dependency: bool,
}

impl Dependency {
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
            prerequisite: false,
            dependency: false,
        }
    }
}

/// A file copied into the runtime when the feature is installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub final_name: String,
    pub location: String,
    pub overwrite: bool,
}

/// Bundles installed only when every condition feature is part of the deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditional {
    pub condition: Vec<String>,
    pub bundles: Vec<BundleInfo>,
}

/// A feature as declared by a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub install: Option<String>,
    pub bundles: Vec<BundleInfo>,
    pub dependencies: Vec<Dependency>,
    pub config: IndexMap<String, IndexMap<String, String>>,
    pub config_files: Vec<ConfigFile>,
    pub conditionals: Vec<Conditional>,
    /// Raw `Require-Capability` style clauses
    pub requirements: Vec<String>,
    /// Raw `Provide-Capability` style clauses
    pub capabilities: Vec<String>,
}

impl Feature {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            install: None,
            bundles: Vec::new(),
            dependencies: Vec::new(),
            config: IndexMap::new(),
            config_files: Vec::new(),
            conditionals: Vec::new(),
            requirements: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    pub fn id(&self) -> FeatureId {
        FeatureId::new(self.name.clone(), self.version.clone())
    }

    /// Parsed version, cleaned up from Maven style when needed
    pub fn parsed_version(&self) -> Version {
        Version::parse_lenient(&self.version)
    }

    /// Add a bundle (builder style, mostly for tests)
    pub fn with_bundle(mut self, location: impl Into<String>) -> Self {
        self.bundles.push(BundleInfo::new(location));
        self
    }

    /// Add a feature dependency (builder style, mostly for tests)
    pub fn with_dependency(mut self, name: impl Into<String>, version: Option<&str>) -> Self {
        self.dependencies
            .push(Dependency::new(name, version.map(str::to_string)));
        self
    }
}

/// Turn a feature version reference into a constraint
///
/// `None`, empty and `0.0.0` mean "any version"; a plain version is exact; a
/// bracketed range is used as is and must be well formed.
pub fn version_constraint(version: Option<&str>) -> Result<Option<VersionRange>, VersionError> {
    let Some(version) = version.map(str::trim).filter(|v| !v.is_empty() && *v != DEFAULT_VERSION) else {
        return Ok(None);
    };
    if version.starts_with('[') || version.starts_with('(') {
        VersionRange::parse(version).map(Some)
    } else {
        Ok(Some(VersionRange::exact(Version::parse_lenient(version))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_id_parse_and_display() {
        let id = FeatureId::parse("core/1.0.0");
        assert_eq!(id, FeatureId::new("core", "1.0.0"));
        assert_eq!(id.to_string(), "core/1.0.0");
        assert_eq!(FeatureId::parse("core").version, DEFAULT_VERSION);
    }

    #[test]
    fn test_version_constraint() {
        assert!(version_constraint(None).unwrap().is_none());
        assert!(version_constraint(Some("0.0.0")).unwrap().is_none());
        assert!(version_constraint(Some(" ")).unwrap().is_none());

        let exact = version_constraint(Some("1.2")).unwrap().unwrap();
        assert!(exact.includes(&Version::new(1, 2, 0)));
        assert!(!exact.includes(&Version::new(1, 2, 1)));

        let range = version_constraint(Some("[1,2)")).unwrap().unwrap();
        assert!(range.includes(&Version::new(1, 9, 0)));
        assert!(!range.includes(&Version::new(2, 0, 0)));
    }

    #[test]
    fn test_malformed_range_is_rejected() {
        assert!(matches!(
            version_constraint(Some("[1.0,2.0")),
            Err(VersionError::InvalidRange { .. })
        ));
        assert!(version_constraint(Some("(2,1)")).is_err());
    }

    #[test]
    fn test_parsed_version_cleans_maven_versions() {
        let feature = Feature::new("core", "1.0-SNAPSHOT");
        assert_eq!(feature.parsed_version(), Version::with_qualifier(1, 0, 0, "SNAPSHOT"));
    }
}
