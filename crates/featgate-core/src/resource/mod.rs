//! Capability model of installable resources.
//!
//! A [`Resource`] is described by what it provides ([`Capability`]) and what it
//! needs ([`Requirement`]). Resources are built from OSGi manifest headers by
//! [`ResourceBuilder`].

mod builder;
mod filter;
mod header;
mod manifest;

pub use builder::{range_filters, ResourceBuilder, FEATURE_TYPE};
pub use filter::{Filter, FilterError};
pub use header::{parse_header, Clause, HeaderError};
pub use manifest::{Manifest, MANIFEST_PATH, SYMBOLIC_NAME};

use std::fmt;

use featgate_version::Version;
use indexmap::IndexMap;

/// Well-known capability namespaces
pub mod namespace {
    pub const IDENTITY: &str = "osgi.identity";
    pub const PACKAGE: &str = "osgi.wiring.package";
    pub const BUNDLE: &str = "osgi.wiring.bundle";
    pub const HOST: &str = "osgi.wiring.host";
    pub const EE: &str = "osgi.ee";
}

/// Typed attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Version(Version),
    Long(i64),
    Double(f64),
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_version(&self) -> Option<&Version> {
        match self {
            AttributeValue::Version(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => write!(f, "{}", s),
            AttributeValue::Version(v) => write!(f, "{}", v),
            AttributeValue::Long(l) => write!(f, "{}", l),
            AttributeValue::Double(d) => write!(f, "{}", d),
            AttributeValue::List(items) => {
                let items: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "{}", items.join(","))
            }
        }
    }
}

pub type Attributes = IndexMap<String, AttributeValue>;

/// Something a resource provides
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    pub namespace: String,
    pub attributes: Attributes,
    pub directives: IndexMap<String, String>,
}

impl Capability {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            attributes: IndexMap::new(),
            directives: IndexMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// Something a resource needs
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub namespace: String,
    pub filter: Option<Filter>,
    pub optional: bool,
}

impl Requirement {
    pub fn new(namespace: impl Into<String>, filter: Option<Filter>) -> Self {
        Self {
            namespace: namespace.into(),
            filter,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Whether `capability` satisfies this requirement
    pub fn is_satisfied_by(&self, capability: &Capability) -> bool {
        capability.namespace == self.namespace
            && self
                .filter
                .as_ref()
                .map(|f| f.matches(&capability.attributes))
                .unwrap_or(true)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.namespace)?;
        if let Some(filter) = &self.filter {
            write!(f, "; {}", filter)?;
        }
        if self.optional {
            write!(f, "; resolution:=optional")?;
        }
        Ok(())
    }
}

/// An installable unit: a bundle, a feature or the runtime itself
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Location the resource was loaded from
    pub id: String,
    pub symbolic_name: String,
    pub version: Version,
    pub singleton: bool,
    /// Symbolic name of the host when this resource is a fragment
    pub fragment_host: Option<String>,
    pub capabilities: Vec<Capability>,
    pub requirements: Vec<Requirement>,
}

impl Resource {
    pub fn new(id: impl Into<String>, symbolic_name: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            symbolic_name: symbolic_name.into(),
            version,
            singleton: false,
            fragment_host: None,
            capabilities: Vec::new(),
            requirements: Vec::new(),
        }
    }

    /// Whether any capability of this resource satisfies `requirement`
    pub fn provides(&self, requirement: &Requirement) -> bool {
        self.capabilities.iter().any(|c| requirement.is_satisfied_by(c))
    }

    /// Capabilities of a namespace
    pub fn capabilities_in<'a>(&'a self, namespace: &'a str) -> impl Iterator<Item = &'a Capability> {
        self.capabilities.iter().filter(move |c| c.namespace == namespace)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.symbolic_name, self.version)
    }
}
