//! Build [`Resource`]s from manifest headers and feature declarations.

use featgate_version::{Version, VersionRange};

use super::header::{parse_header, Clause, HeaderError};
use super::manifest::{Manifest, SYMBOLIC_NAME};
use super::{namespace, AttributeValue, Capability, Filter, Requirement, Resource};
use crate::feature::Feature;

const BUNDLE_VERSION: &str = "Bundle-Version";
const EXPORT_PACKAGE: &str = "Export-Package";
const IMPORT_PACKAGE: &str = "Import-Package";
const REQUIRE_BUNDLE: &str = "Require-Bundle";
const FRAGMENT_HOST: &str = "Fragment-Host";
const PROVIDE_CAPABILITY: &str = "Provide-Capability";
const REQUIRE_CAPABILITY: &str = "Require-Capability";

/// Resource type of feature resources
pub const FEATURE_TYPE: &str = "karaf.feature";

pub struct ResourceBuilder;

impl ResourceBuilder {
    /// Build a bundle resource from its manifest
    pub fn build(id: &str, manifest: &Manifest) -> Result<Resource, HeaderError> {
        let bsn_header = manifest
            .get(SYMBOLIC_NAME)
            .ok_or_else(|| HeaderError::Missing(SYMBOLIC_NAME.to_string()))?;
        let bsn_clause = parse_header(bsn_header)?
            .into_iter()
            .next()
            .ok_or_else(|| HeaderError::Missing(SYMBOLIC_NAME.to_string()))?;
        let symbolic_name = bsn_clause.paths[0].clone();

        let version = match manifest.get(BUNDLE_VERSION) {
            Some(v) => Version::parse(v).map_err(|e| HeaderError::InvalidValue {
                header: BUNDLE_VERSION.to_string(),
                reason: e.to_string(),
            })?,
            None => Version::empty(),
        };

        let mut resource = Resource::new(id, symbolic_name.clone(), version.clone());
        resource.singleton = bsn_clause.directive("singleton") == Some("true");

        let host = match manifest.get(FRAGMENT_HOST) {
            Some(header) => parse_header(header)?.into_iter().next(),
            None => None,
        };

        resource.capabilities.push(
            Capability::new(namespace::IDENTITY)
                .with_attribute(namespace::IDENTITY, AttributeValue::String(symbolic_name.clone()))
                .with_attribute(
                    "type",
                    AttributeValue::String(if host.is_some() { "osgi.fragment" } else { "osgi.bundle" }.to_string()),
                )
                .with_attribute("version", AttributeValue::Version(version.clone())),
        );

        match host {
            Some(host) => {
                let mut filters = vec![Filter::equal(namespace::HOST, host.paths[0].clone())];
                filters.extend(range_attribute_filters(&host, "bundle-version", "bundle-version")?);
                resource.fragment_host = Some(host.paths[0].clone());
                resource
                    .requirements
                    .push(Requirement::new(namespace::HOST, Some(Filter::all(filters))));
            }
            None => {
                for ns in [namespace::BUNDLE, namespace::HOST] {
                    resource.capabilities.push(
                        Capability::new(ns)
                            .with_attribute(ns, AttributeValue::String(symbolic_name.clone()))
                            .with_attribute("bundle-version", AttributeValue::Version(version.clone())),
                    );
                }
            }
        }

        if let Some(header) = manifest.get(EXPORT_PACKAGE) {
            for clause in parse_header(header)? {
                resource
                    .capabilities
                    .extend(export_capabilities(&clause, &symbolic_name, &version)?);
            }
        }

        if let Some(header) = manifest.get(PROVIDE_CAPABILITY) {
            resource.capabilities.extend(provided_capabilities(header)?);
        }

        if let Some(header) = manifest.get(IMPORT_PACKAGE) {
            for clause in parse_header(header)? {
                for path in &clause.paths {
                    let mut filters = vec![Filter::equal(namespace::PACKAGE, path.clone())];
                    let version_attr = if clause.attribute("version").is_some() {
                        "version"
                    } else {
                        "specification-version"
                    };
                    filters.extend(range_attribute_filters(&clause, version_attr, "version")?);
                    if let Some(bsn) = clause.attribute_str("bundle-symbolic-name") {
                        filters.push(Filter::equal("bundle-symbolic-name", bsn));
                    }
                    filters.extend(range_attribute_filters(&clause, "bundle-version", "bundle-version")?);

                    let mut requirement = Requirement::new(namespace::PACKAGE, Some(Filter::all(filters)));
                    requirement.optional = clause.is_optional();
                    resource.requirements.push(requirement);
                }
            }
        }

        if let Some(header) = manifest.get(REQUIRE_BUNDLE) {
            for clause in parse_header(header)? {
                for path in &clause.paths {
                    let mut filters = vec![Filter::equal(namespace::BUNDLE, path.clone())];
                    filters.extend(range_attribute_filters(&clause, "bundle-version", "bundle-version")?);
                    let mut requirement = Requirement::new(namespace::BUNDLE, Some(Filter::all(filters)));
                    requirement.optional = clause.is_optional();
                    resource.requirements.push(requirement);
                }
            }
        }

        if let Some(header) = manifest.get(REQUIRE_CAPABILITY) {
            resource.requirements.extend(required_capabilities(header)?);
        }

        Ok(resource)
    }

    /// Build the resource standing for a feature's own requirements and capabilities
    pub fn build_feature(feature: &Feature) -> Result<Resource, HeaderError> {
        let version = feature.parsed_version();
        let mut resource = Resource::new(
            format!("feature:{}", feature.id()),
            feature.name.clone(),
            version.clone(),
        );

        resource.capabilities.push(
            Capability::new(namespace::IDENTITY)
                .with_attribute(namespace::IDENTITY, AttributeValue::String(feature.name.clone()))
                .with_attribute("type", AttributeValue::String(FEATURE_TYPE.to_string()))
                .with_attribute("version", AttributeValue::Version(version)),
        );

        for capability in &feature.capabilities {
            resource.capabilities.extend(provided_capabilities(capability)?);
        }
        for requirement in &feature.requirements {
            resource.requirements.extend(required_capabilities(requirement)?);
        }

        Ok(resource)
    }

    /// Parse a raw requirement such as `osgi.ee;filter:="(osgi.ee=JavaSE)"`
    pub fn requirements(raw: &str) -> Result<Vec<Requirement>, HeaderError> {
        required_capabilities(raw)
    }
}

fn export_capabilities(
    clause: &Clause,
    symbolic_name: &str,
    bundle_version: &Version,
) -> Result<Vec<Capability>, HeaderError> {
    let version = match clause
        .attribute_str("version")
        .or_else(|| clause.attribute_str("specification-version"))
    {
        Some(v) => Version::parse(&v).map_err(|e| HeaderError::InvalidValue {
            header: EXPORT_PACKAGE.to_string(),
            reason: e.to_string(),
        })?,
        None => Version::empty(),
    };

    let capabilities = clause
        .paths
        .iter()
        .map(|path| {
            let mut capability = Capability::new(namespace::PACKAGE)
                .with_attribute(namespace::PACKAGE, AttributeValue::String(path.clone()))
                .with_attribute("version", AttributeValue::Version(version.clone()))
                .with_attribute(
                    "bundle-symbolic-name",
                    AttributeValue::String(symbolic_name.to_string()),
                )
                .with_attribute("bundle-version", AttributeValue::Version(bundle_version.clone()));
            for (name, value) in &clause.attributes {
                if name != "version" && name != "specification-version" {
                    capability.attributes.insert(name.clone(), value.clone());
                }
            }
            capability.directives = clause.directives.clone();
            capability
        })
        .collect();

    Ok(capabilities)
}

fn provided_capabilities(header: &str) -> Result<Vec<Capability>, HeaderError> {
    let mut capabilities = Vec::new();
    for clause in parse_header(header)? {
        for path in &clause.paths {
            let mut capability = Capability::new(path.clone());
            capability.attributes = clause.attributes.clone();
            capability.directives = clause.directives.clone();
            capabilities.push(capability);
        }
    }
    Ok(capabilities)
}

fn required_capabilities(header: &str) -> Result<Vec<Requirement>, HeaderError> {
    let mut requirements = Vec::new();
    for clause in parse_header(header)? {
        // Only requirements effective at resolve time take part
        if let Some(effective) = clause.directive("effective") {
            if effective != "resolve" {
                continue;
            }
        }

        let filter = match clause.directive("filter") {
            Some(text) => Some(Filter::parse(text).map_err(|e| HeaderError::InvalidValue {
                header: REQUIRE_CAPABILITY.to_string(),
                reason: e.to_string(),
            })?),
            None => None,
        };

        for path in &clause.paths {
            let mut requirement = Requirement::new(path.clone(), filter.clone());
            requirement.optional = clause.is_optional();
            requirements.push(requirement);
        }
    }
    Ok(requirements)
}

/// Filters constraining `target` to the range held by the clause attribute `source`
fn range_attribute_filters(clause: &Clause, source: &str, target: &str) -> Result<Vec<Filter>, HeaderError> {
    match clause.attribute_str(source) {
        Some(range) => {
            let range = VersionRange::parse(&range).map_err(|e| HeaderError::InvalidClause {
                clause: clause.paths.join(";"),
                reason: e.to_string(),
            })?;
            Ok(range_filters(target, &range))
        }
        None => Ok(Vec::new()),
    }
}

/// Express a version range as filter terms
pub fn range_filters(attr: &str, range: &VersionRange) -> Vec<Filter> {
    let mut filters = Vec::new();

    let floor = range.floor();
    if floor.is_inclusive() {
        if *floor.version() != Version::empty() {
            filters.push(Filter::GreaterEq {
                attr: attr.to_string(),
                value: floor.version().to_string(),
            });
        }
    } else {
        filters.push(Filter::Not(Box::new(Filter::LessEq {
            attr: attr.to_string(),
            value: floor.version().to_string(),
        })));
    }

    if let Some(ceiling) = range.ceiling() {
        if ceiling.is_inclusive() {
            filters.push(Filter::LessEq {
                attr: attr.to_string(),
                value: ceiling.version().to_string(),
            });
        } else {
            filters.push(Filter::Not(Box::new(Filter::GreaterEq {
                attr: attr.to_string(),
                value: ceiling.version().to_string(),
            })));
        }
    }

    filters
}
