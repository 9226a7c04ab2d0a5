//! JSON features descriptor schema.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{BundleInfo, Conditional, ConfigFile, Dependency, Feature, DEFAULT_VERSION};

/// Root of a features descriptor document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeaturesDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Nested repository URIs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<FeatureEntry>,
}

impl FeaturesDescriptor {
    /// Parse a descriptor from JSON bytes
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Convert every entry into the feature model
    pub fn to_features(&self) -> Vec<Feature> {
        self.features.iter().map(FeatureEntry::to_feature).collect()
    }
}

/// A feature declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FeatureEntry {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bundles: Vec<BundleEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<DependencyEntry>,

    /// `pid -> key -> value`; non-string values are kept in their JSON form
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub config: IndexMap<String, IndexMap<String, Value>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub configfiles: Vec<ConfigFileEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditionals: Vec<ConditionalEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
}

impl FeatureEntry {
    pub fn to_feature(&self) -> Feature {
        let version = self
            .version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_VERSION);

        let mut feature = Feature::new(self.name.trim(), version);
        feature.description = self.description.clone();
        feature.install = self.install.clone();
        feature.bundles = self.bundles.iter().map(BundleEntry::to_bundle_info).collect();
        feature.dependencies = self.features.iter().map(DependencyEntry::to_dependency).collect();
        feature.config = self
            .config
            .iter()
            .map(|(pid, entries)| {
                let entries = entries
                    .iter()
                    .map(|(k, v)| (k.clone(), config_value(v)))
                    .collect();
                (pid.clone(), entries)
            })
            .collect();
        feature.config_files = self
            .configfiles
            .iter()
            .map(|c| ConfigFile {
                final_name: c.finalname.clone(),
                location: c.location.clone(),
                overwrite: c.overwrite,
            })
            .collect();
        feature.conditionals = self
            .conditionals
            .iter()
            .map(|c| Conditional {
                condition: c.condition.as_vec(),
                bundles: c.bundles.iter().map(BundleEntry::to_bundle_info).collect(),
            })
            .collect();
        feature.requirements = self.requirements.clone();
        feature.capabilities = self.capabilities.clone();
        feature
    }
}

/// Bundle reference - can be a location string or an object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BundleEntry {
    Location(String),
    Detailed {
        location: String,
        #[serde(default, rename = "start-level", skip_serializing_if = "Option::is_none")]
        start_level: Option<u32>,
        #[serde(default)]
        dependency: bool,
    },
}

impl BundleEntry {
    pub fn location(&self) -> &str {
        match self {
            BundleEntry::Location(location) => location,
            BundleEntry::Detailed { location, .. } => location,
        }
    }

    pub fn to_bundle_info(&self) -> BundleInfo {
        match self {
            BundleEntry::Location(location) => BundleInfo::new(location.trim()),
            BundleEntry::Detailed {
                location,
                start_level,
                dependency,
            } => BundleInfo {
                location: location.trim().to_string(),
                start_level: *start_level,
                dependency: *dependency,
            },
        }
    }
}

/// Feature dependency - can be a name (optionally `name/version`) or an object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyEntry {
    Name(String),
    Detailed {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(default)]
        prerequisite: bool,
        #[serde(default)]
        dependency: bool,
    },
}

impl DependencyEntry {
    pub fn to_dependency(&self) -> Dependency {
        match self {
            DependencyEntry::Name(name) => match name.split_once('/') {
                Some((name, version)) => Dependency::new(name.trim(), Some(version.trim().to_string())),
                None => Dependency::new(name.trim(), None),
            },
            DependencyEntry::Detailed {
                name,
                version,
                prerequisite,
                dependency,
            } => Dependency {
                name: name.trim().to_string(),
                version: version.clone(),
                prerequisite: *prerequisite,
                dependency: *dependency,
            },
        }
    }
}

/// Configuration file copied by a feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFileEntry {
    pub finalname: String,
    pub location: String,
    #[serde(default)]
    pub overwrite: bool,
}

/// Conditional bundles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalEntry {
    pub condition: Condition,
    #[serde(default)]
    pub bundles: Vec<BundleEntry>,
}

/// Condition list - can be a single feature name or an array
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Single(String),
    Multiple(Vec<String>),
}

impl Condition {
    pub fn as_vec(&self) -> Vec<String> {
        match self {
            Condition::Single(s) => vec![s.clone()],
            Condition::Multiple(v) => v.clone(),
        }
    }
}

fn config_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
