//! Turning plain jars into bundles (`wrap:` and `fab:` locations).

use std::collections::BTreeSet;

use featgate_version::Version;
use indexmap::IndexMap;

use super::archive::{ArchiveReader, ArchiveType};
use super::mvn::MavenCoordinate;
use crate::error::ArtifactFetchError;
use crate::resource::Manifest;

const WRAP_PREFIX: &str = "wrap:";
const FAB_PREFIX: &str = "fab:";

/// A parsed `wrap:<inner>[$Header=value&...]` location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapUrl {
    pub location: String,
    pub inner: String,
    /// Manifest headers requested by the location
    pub instructions: IndexMap<String, String>,
}

impl WrapUrl {
    /// Whether a location needs wrapping
    pub fn is_wrapped(location: &str) -> bool {
        location.starts_with(WRAP_PREFIX) || location.starts_with(FAB_PREFIX)
    }

    pub fn parse(location: &str) -> Result<Self, ArtifactFetchError> {
        let rest = location
            .strip_prefix(WRAP_PREFIX)
            .or_else(|| location.strip_prefix(FAB_PREFIX))
            .ok_or_else(|| ArtifactFetchError::InvalidLocation(location.to_string()))?;

        let (inner, query) = match rest.split_once('$') {
            Some((inner, query)) => (inner, Some(query)),
            None => (rest, None),
        };
        if inner.is_empty() {
            return Err(ArtifactFetchError::InvalidLocation(location.to_string()));
        }

        let mut instructions = IndexMap::new();
        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            if pair.is_empty() {
                continue;
            }
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let decode = |s: &str| {
                urlencoding::decode(s)
                    .map(|d| d.into_owned())
                    .map_err(|e| ArtifactFetchError::Wrap {
                        location: location.to_string(),
                        reason: format!("invalid instruction encoding: {}", e),
                    })
            };
            instructions.insert(decode(name)?, decode(value)?);
        }

        Ok(Self {
            location: location.to_string(),
            inner: inner.to_string(),
            instructions,
        })
    }
}

/// Produces a bundle manifest for an archive that may not carry one
pub trait ArchiveWrapper: Send + Sync {
    fn wrap(&self, url: &WrapUrl, bytes: &[u8]) -> Result<Manifest, ArtifactFetchError>;
}

/// Default wrapper working from the jar's entries
///
/// `Export-Package` defaults to every package that contains classes;
/// `Import-Package` is only taken from the instructions since class files are
/// not analyzed.
#[derive(Debug, Default, Clone, Copy)]
pub struct JarWrapper;

impl ArchiveWrapper for JarWrapper {
    fn wrap(&self, url: &WrapUrl, bytes: &[u8]) -> Result<Manifest, ArtifactFetchError> {
        let wrap_error = |reason: String| ArtifactFetchError::Wrap {
            location: url.location.clone(),
            reason,
        };

        let reader = ArchiveReader::new(bytes, ArchiveType::Zip);
        let existing = match reader.read_entry(crate::resource::MANIFEST_PATH).map_err(wrap_error)? {
            Some(content) => Manifest::parse(&content).map_err(|e| wrap_error(e.to_string()))?,
            None => Manifest::new(),
        };

        let coordinate = MavenCoordinate::parse_url(&url.inner);
        let mut manifest = existing.clone();
        manifest.insert("Bundle-ManifestVersion", "2");

        let symbolic_name = existing
            .symbolic_name()
            .map(str::to_string)
            .or_else(|| {
                coordinate
                    .as_ref()
                    .map(|c| format!("{}.{}", c.group_id, c.artifact_id))
            })
            .unwrap_or_else(|| symbolic_name_from_location(&url.inner));
        manifest.insert("Bundle-SymbolicName", symbolic_name);

        let version = existing
            .get("Bundle-Version")
            .map(str::to_string)
            .or_else(|| {
                coordinate
                    .as_ref()
                    .map(|c| Version::parse_lenient(&c.version).to_string())
            })
            .unwrap_or_else(|| Version::empty().to_string());
        manifest.insert("Bundle-Version", version.clone());

        if existing.get("Export-Package").is_none() {
            let packages = class_packages(&reader.entry_names().map_err(wrap_error)?);
            if !packages.is_empty() {
                let exports: Vec<String> = packages
                    .iter()
                    .map(|p| format!("{};version=\"{}\"", p, version))
                    .collect();
                manifest.insert("Export-Package", exports.join(","));
            }
        }

        for (name, value) in &url.instructions {
            manifest.insert(name.clone(), value.clone());
        }

        log::debug!(
            "Wrapped {} as {}",
            url.inner,
            manifest.symbolic_name().unwrap_or_default()
        );
        Ok(manifest)
    }
}

/// Packages holding at least one class, META-INF and versioned entries excluded
fn class_packages(entries: &[String]) -> BTreeSet<String> {
    entries
        .iter()
        .filter(|e| e.ends_with(".class") && !e.starts_with("META-INF/"))
        .filter_map(|e| e.rsplit_once('/').map(|(dir, _)| dir.replace('/', ".")))
        .collect()
}

fn symbolic_name_from_location(location: &str) -> String {
    let file = location.rsplit(['/', '\\', ':']).next().unwrap_or(location);
    let stem = file
        .strip_suffix(".jar")
        .or_else(|| file.strip_suffix(".zip"))
        .unwrap_or(file);
    let name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() {
        "wrapped".to_string()
    } else {
        name
    }
}
