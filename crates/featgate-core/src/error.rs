use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::feature::FeatureId;
use crate::http::HttpError;
use crate::properties::PropertiesError;

/// Top-level error of a verification run
#[derive(Error, Debug)]
pub enum VerifyError {
    // Fatal errors, raised before any feature is verified
    #[error("Unable to load features descriptors: {0}")]
    MetadataLoad(#[from] MetadataLoadError),

    #[error("Unable to synthesize the runtime environment: {0}")]
    RuntimeSynthesis(#[from] RuntimeSynthesisError),

    #[error("Unable to load additional metadata from {}: {source}", .path.display())]
    AdditionalMetadata {
        path: PathBuf,
        source: PropertiesError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    // Verification errors
    #[error(transparent)]
    Feature(#[from] FeatureResolutionError),

    #[error(transparent)]
    Aggregate(#[from] AggregateFailure),
}

impl VerifyError {
    /// Whether the run failed because features did not resolve, as opposed to
    /// a fatal setup problem
    pub fn is_verification_failure(&self) -> bool {
        matches!(self, VerifyError::Feature(_) | VerifyError::Aggregate(_))
    }
}

pub type Result<T> = std::result::Result<T, VerifyError>;

/// Failure to fetch or parse a features descriptor
#[derive(Error, Debug)]
pub enum MetadataLoadError {
    #[error("Failed to fetch descriptor {uri}: {source}")]
    Fetch {
        uri: String,
        source: ArtifactFetchError,
    },

    #[error("Failed to parse descriptor {uri}: {source}")]
    Parse {
        uri: String,
        source: serde_json::Error,
    },

    #[error("Invalid descriptor {uri}: {message}")]
    Invalid { uri: String, message: String },

    #[error("Feature {id} is declared by both {first} and {second}")]
    DuplicateFeature {
        id: String,
        first: String,
        second: String,
    },
}

/// Failure to build the system bundle from the base distribution
#[derive(Error, Debug)]
pub enum RuntimeSynthesisError {
    #[error("Invalid distribution coordinate: {0}")]
    InvalidDistribution(String),

    #[error("Failed to fetch distribution {coordinate}: {source}")]
    Fetch {
        coordinate: String,
        source: ArtifactFetchError,
    },

    #[error("Configuration file {path} not found in distribution {distribution}")]
    ConfigNotFound { distribution: String, path: String },

    #[error("Failed to read distribution {distribution}: {reason}")]
    Archive { distribution: String, reason: String },

    #[error("Invalid runtime configuration {path}: {source}")]
    Properties {
        path: String,
        source: PropertiesError,
    },

    #[error("Invalid system bundle header: {0}")]
    Header(String),
}

/// Failure to materialize one artifact
#[derive(Error, Debug)]
pub enum ArtifactFetchError {
    #[error("Invalid artifact location: {0}")]
    InvalidLocation(String),

    #[error("Artifact {location} not found (tried: {})", .tried.join(", "))]
    NotFound { location: String, tried: Vec<String> },

    #[error("Download of {location} failed: {source}")]
    Http {
        location: String,
        source: HttpError,
    },

    #[error("IO error reading {location}: {source}")]
    Io {
        location: String,
        source: std::io::Error,
    },

    #[error("Checksum mismatch for {location}")]
    ChecksumMismatch { location: String },

    #[error("Invalid archive {location}: {reason}")]
    Archive { location: String, reason: String },

    #[error("{location} is not an OSGi bundle (no Bundle-SymbolicName header)")]
    NotABundle { location: String },

    #[error("Invalid manifest in {location}: {reason}")]
    Manifest { location: String, reason: String },

    #[error("Unable to wrap {location}: {reason}")]
    Wrap { location: String, reason: String },
}

/// The capability graph cannot be satisfied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    #[error("Unable to resolve {resource}: missing requirement {requirement}")]
    MissingRequirement { resource: String, requirement: String },

    #[error("Singleton conflict: {first} and {second} share the symbolic name {name}")]
    SingletonConflict {
        name: String,
        first: String,
        second: String,
    },

    #[error("No matching feature for {name}/{version}")]
    FeatureNotFound { name: String, version: String },

    #[error("Invalid requirement {requirement}: {reason}")]
    InvalidRequirement { requirement: String, reason: String },

    #[error("Invalid headers for {resource}: {reason}")]
    InvalidResource { resource: String, reason: String },
}

/// Why a single feature failed to verify
#[derive(Debug)]
pub enum FailureCause {
    Fetch(ArtifactFetchError),
    Resolve(ResolverError),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Fetch(e) => write!(f, "{}", e),
            FailureCause::Resolve(e) => write!(f, "{}", e),
        }
    }
}

/// Per-feature failure together with the context needed to diagnose it
#[derive(Debug)]
pub struct FeatureResolutionError {
    pub feature: FeatureId,
    pub cause: FailureCause,
    /// Repository URIs in play, sorted
    pub repositories: BTreeSet<String>,
    /// Artifacts fetched before the failure, sorted
    pub resources: BTreeSet<String>,
}

impl FeatureResolutionError {
    pub fn new(
        feature: FeatureId,
        cause: FailureCause,
        repositories: BTreeSet<String>,
        resources: BTreeSet<String>,
    ) -> Self {
        Self {
            feature,
            cause,
            repositories,
            resources,
        }
    }

    /// Whether the resolver itself rejected the request
    pub fn is_resolution_failure(&self) -> bool {
        matches!(self.cause, FailureCause::Resolve(_))
    }
}

impl fmt::Display for FeatureResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cause {
            FailureCause::Resolve(_) => write!(f, "Feature resolution failed for {}", self.feature)?,
            FailureCause::Fetch(_) => write!(f, "Error verifying feature {}", self.feature)?,
        }
        write!(f, "\nMessage: {}", self.cause)?;
        write!(f, "\nRepositories: {}", bracketed(&self.repositories))?;
        write!(f, "\nResources: {}", bracketed(&self.resources))
    }
}

impl std::error::Error for FeatureResolutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            FailureCause::Fetch(e) => Some(e),
            FailureCause::Resolve(e) => Some(e),
        }
    }
}

/// Every failure collected by a run that verifies all features before failing
#[derive(Debug)]
pub struct AggregateFailure {
    pub failures: Vec<FeatureResolutionError>,
}

impl AggregateFailure {
    pub fn new(failures: Vec<FeatureResolutionError>) -> Self {
        Self { failures }
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Verification failures ({} of the verified features failed)", self.failures.len())
    }
}

impl std::error::Error for AggregateFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures.first().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Format a set as an indented bracketed block
pub fn bracketed<'a, I>(items: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let mut out = String::from("{\n");
    for item in items {
        out.push('\t');
        out.push_str(item);
        out.push('\n');
    }
    out.push('}');
    out
}
