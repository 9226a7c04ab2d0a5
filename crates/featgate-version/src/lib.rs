//! OSGi versioning for featgate
//!
//! This crate provides version parsing, ordering and version range matching
//! following the OSGi `major.minor.micro.qualifier` scheme used by bundle
//! manifests and feature descriptors.

mod range;
mod version;

pub use range::{Bound, VersionRange};
pub use version::{Version, VersionError};
