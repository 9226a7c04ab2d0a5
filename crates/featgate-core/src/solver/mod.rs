//! Capability resolution.
//!
//! A [`Resolver`] decides whether a set of resources can be wired together on
//! top of a root resource describing the runtime.

mod resolver;

pub use resolver::CapabilityResolver;

use std::sync::Arc;

use crate::error::ResolverError;
use crate::resource::{Requirement, Resource};

/// Resources and requirements handed to a [`Resolver`]
#[derive(Debug, Clone, Default)]
pub struct ResourceSet {
    /// Resources that must be part of the result
    pub mandatory: Vec<Arc<Resource>>,
    /// Resources used only when they satisfy an otherwise open requirement
    pub optional: Vec<Arc<Resource>>,
    /// Requirements of the deployment itself
    pub requirements: Vec<Requirement>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mandatory(mut self, resource: Resource) -> Self {
        self.mandatory.push(Arc::new(resource));
        self
    }

    pub fn with_optional(mut self, resource: Resource) -> Self {
        self.optional.push(Arc::new(resource));
        self
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn len(&self) -> usize {
        self.mandatory.len() + self.optional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mandatory.is_empty() && self.optional.is_empty()
    }
}

pub trait Resolver: Send + Sync {
    /// Resolve `resources` against `root`, returning the selected resources
    ///
    /// Optional requirements are only wired when `allow_optional_imports` is set.
    fn resolve(
        &self,
        root: &Resource,
        resources: &ResourceSet,
        allow_optional_imports: bool,
    ) -> Result<Vec<Arc<Resource>>, ResolverError>;
}
