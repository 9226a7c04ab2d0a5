//! Ahead-of-deployment verification of feature resolution.
//!
//! A run loads features descriptors, selects the features to check, builds a
//! description of the target runtime from a base distribution and then asks a
//! capability resolver, once per feature, whether the feature and everything
//! it pulls in can be wired together. Nothing is installed.

pub mod aggregator;
pub mod config;
pub mod deployment;
pub mod downloader;
pub mod error;
pub mod feature;
pub mod http;
pub mod properties;
pub mod report;
pub mod repository;
pub mod resource;
pub mod runtime;
pub mod selector;
pub mod solver;
pub mod verification;
pub mod verifier;

pub use aggregator::{FailureAggregator, FailurePolicy};
pub use config::VerifyConfig;
pub use deployment::{DeploymentBuilder, DeploymentRequest};
pub use downloader::{ArtifactFetcher, DownloadConfig, DownloadManager, MemoryFetcher};
pub use error::{
    AggregateFailure, ArtifactFetchError, FeatureResolutionError, MetadataLoadError, ResolverError,
    Result, RuntimeSynthesisError, VerifyError,
};
pub use feature::{Feature, FeatureId};
pub use properties::Properties;
pub use report::{Reporter, Verbosity};
pub use repository::{Repository, RepositoryLoader, RepositoryManager};
pub use resource::{Capability, Requirement, Resource};
pub use runtime::{RuntimeEnvironment, RuntimeEnvironmentBuilder};
pub use selector::{select_features, SelectionPattern};
pub use solver::{CapabilityResolver, Resolver, ResourceSet};
pub use verification::{FeatureVerification, RunSummary, Selection};
pub use verifier::{Resolution, ResolutionOutcome, ResolutionVerifier};
