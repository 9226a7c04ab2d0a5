//! The target runtime's built-in capabilities.
//!
//! The runtime is described by a synthetic `system-bundle` resource that
//! exports the packages and provides the capabilities declared by the base
//! distribution's `etc/config.properties`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::downloader::{ArchiveReader, ArchiveType, ArtifactFetcher, MavenCoordinate};
use crate::error::RuntimeSynthesisError;
use crate::properties::Properties;
use crate::resource::{Manifest, Resource, ResourceBuilder};

pub const DEFAULT_DISTRIBUTION: &str = "mvn:org.apache.karaf/apache-karaf/4.4.6/tar.gz";
pub const SYSTEM_BUNDLE: &str = "system-bundle";
pub const JAVA_SPECIFICATION_VERSION: &str = "java.specification.version";
/// Global property overriding the specification version
pub const JAVASE_PROPERTY: &str = "javase";

const DEFAULT_JAVASE: &str = "1.8";
const DEFAULT_DISTRIBUTION_TYPE: &str = "tar.gz";
const CONFIG_FILE: &str = "config.properties";
const INCLUDES: &str = "${includes}";
const OPTIONALS: &str = "${optionals}";
const SYSTEM_PACKAGES: &str = "org.osgi.framework.system.packages";
const SYSTEM_PACKAGES_EXTRA: &str = "org.osgi.framework.system.packages.extra";
const SYSTEM_CAPABILITIES: &str = "org.osgi.framework.system.capabilities";

/// The root every feature resolution starts from
#[derive(Debug, Clone)]
pub struct RuntimeEnvironment {
    resource: Arc<Resource>,
    java_specification_version: String,
    properties: Properties,
}

impl RuntimeEnvironment {
    /// Build the system bundle from substituted runtime properties
    pub fn from_properties(properties: Properties) -> Result<Self, RuntimeSynthesisError> {
        let mut headers = IndexMap::new();
        headers.insert("Bundle-ManifestVersion".to_string(), "2".to_string());
        headers.insert("Bundle-SymbolicName".to_string(), SYSTEM_BUNDLE.to_string());
        headers.insert("Bundle-Version".to_string(), "0.0.0".to_string());

        let mut exports = properties.get(SYSTEM_PACKAGES).unwrap_or_default().to_string();
        if let Some(extra) = properties.get(SYSTEM_PACKAGES_EXTRA) {
            exports.push(',');
            exports.push_str(extra);
        }
        headers.insert("Export-Package".to_string(), exports);

        if let Some(capabilities) = properties.get(SYSTEM_CAPABILITIES) {
            headers.insert("Provide-Capability".to_string(), capabilities.to_string());
        }

        let resource = ResourceBuilder::build(SYSTEM_BUNDLE, &Manifest::from_headers(headers))
            .map_err(|e| RuntimeSynthesisError::Header(e.to_string()))?;

        Ok(Self {
            resource: Arc::new(resource),
            java_specification_version: properties
                .get(JAVA_SPECIFICATION_VERSION)
                .unwrap_or(DEFAULT_JAVASE)
                .to_string(),
            properties,
        })
    }

    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    pub fn java_specification_version(&self) -> &str {
        &self.java_specification_version
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }
}

/// Where the distribution's configuration files come from
enum DistributionFiles {
    Directory(PathBuf),
    /// `etc/` entries read from an archive, keyed by file name
    Archive(HashMap<String, Vec<u8>>),
}

impl DistributionFiles {
    fn read(&self, name: &str) -> Option<Vec<u8>> {
        match self {
            DistributionFiles::Directory(etc) => std::fs::read(etc.join(name)).ok(),
            DistributionFiles::Archive(entries) => entries.get(name).cloned(),
        }
    }

    fn describe(&self, name: &str) -> String {
        match self {
            DistributionFiles::Directory(etc) => etc.join(name).display().to_string(),
            DistributionFiles::Archive(_) => format!("etc/{}", name),
        }
    }
}

/// Synthesizes the [`RuntimeEnvironment`] from a base distribution
#[derive(Debug, Clone)]
pub struct RuntimeEnvironmentBuilder {
    distribution: String,
    dist_dir: Option<String>,
    javase: Option<String>,
    java_home: Option<PathBuf>,
    overrides: Properties,
}

impl Default for RuntimeEnvironmentBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_DISTRIBUTION)
    }
}

impl RuntimeEnvironmentBuilder {
    /// Distribution given as a local path, `mvn:` URL or `groupId:artifactId[:type]:version`
    pub fn new(distribution: impl Into<String>) -> Self {
        Self {
            distribution: distribution.into(),
            dist_dir: None,
            javase: None,
            java_home: std::env::var_os("JAVA_HOME").map(PathBuf::from),
            overrides: Properties::new(),
        }
    }

    /// Top-level directory holding `etc/` inside the distribution
    pub fn dist_dir(mut self, dist_dir: Option<String>) -> Self {
        self.dist_dir = dist_dir.filter(|d| !d.trim().is_empty());
        self
    }

    /// Explicit specification version
    pub fn javase(mut self, javase: Option<String>) -> Self {
        self.javase = javase.filter(|j| !j.trim().is_empty());
        self
    }

    /// Java installation used to detect the specification version
    pub fn java_home(mut self, java_home: Option<PathBuf>) -> Self {
        self.java_home = java_home;
        self
    }

    /// Global properties; `javase` is honored when no explicit version is set
    pub fn global_properties(mut self, properties: &Properties) -> Self {
        if let Some(javase) = properties.get(JAVASE_PROPERTY) {
            self.overrides.insert(JAVASE_PROPERTY, javase);
        }
        self
    }

    /// Effective specification version
    pub fn java_specification_version(&self) -> String {
        self.javase
            .clone()
            .or_else(|| self.overrides.get(JAVASE_PROPERTY).map(str::to_string))
            .or_else(|| self.java_home.as_deref().and_then(detect_java_version))
            .unwrap_or_else(|| DEFAULT_JAVASE.to_string())
    }

    pub async fn build(&self, fetcher: &dyn ArtifactFetcher) -> Result<RuntimeEnvironment, RuntimeSynthesisError> {
        let files = self.locate(fetcher).await?;

        let mut properties = load_with_includes(&files, CONFIG_FILE, true, &mut Vec::new())?
            .ok_or_else(|| RuntimeSynthesisError::ConfigNotFound {
                distribution: self.distribution.clone(),
                path: files.describe(CONFIG_FILE),
            })?;

        let javase = self.java_specification_version();
        log::debug!("Using {}={}", JAVA_SPECIFICATION_VERSION, javase);
        properties.insert(JAVA_SPECIFICATION_VERSION, javase);
        properties
            .substitute()
            .map_err(|source| RuntimeSynthesisError::Properties {
                path: files.describe(CONFIG_FILE),
                source,
            })?;

        let runtime = RuntimeEnvironment::from_properties(properties)?;
        log::debug!(
            "Runtime {} provides {} capabilities",
            self.distribution,
            runtime.resource().capabilities.len()
        );
        Ok(runtime)
    }

    async fn locate(&self, fetcher: &dyn ArtifactFetcher) -> Result<DistributionFiles, RuntimeSynthesisError> {
        let expanded = shellexpand::tilde(&self.distribution).to_string();
        let local = Path::new(&expanded);

        if !self.distribution.starts_with("mvn:") && local.exists() {
            if local.is_dir() {
                let base = match &self.dist_dir {
                    Some(dir) => local.join(dir),
                    None => local.to_path_buf(),
                };
                return Ok(DistributionFiles::Directory(base.join("etc")));
            }

            let bytes = std::fs::read(local).map_err(|e| RuntimeSynthesisError::Archive {
                distribution: self.distribution.clone(),
                reason: e.to_string(),
            })?;
            let file_name = local
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let default_dir = strip_archive_extension(&file_name);
            return self.read_archive(&bytes, ArchiveType::from_name(&file_name), default_dir);
        }

        let coordinate = MavenCoordinate::parse_url(&self.distribution)
            .map(|c| {
                let path = self.distribution.rsplit('!').next().unwrap_or_default();
                if path.split('/').count() < 4 {
                    c.with_extension(DEFAULT_DISTRIBUTION_TYPE)
                } else {
                    c
                }
            })
            .or_else(|| MavenCoordinate::parse_gav(&self.distribution, DEFAULT_DISTRIBUTION_TYPE))
            .ok_or_else(|| RuntimeSynthesisError::InvalidDistribution(self.distribution.clone()))?;

        log::info!("Fetching runtime distribution {}", coordinate);
        let bytes = fetcher
            .fetch_bytes(&coordinate.to_string())
            .await
            .map_err(|source| RuntimeSynthesisError::Fetch {
                coordinate: coordinate.to_string(),
                source,
            })?;

        let default_dir = format!("{}-{}", coordinate.artifact_id, coordinate.version);
        self.read_archive(
            &bytes,
            ArchiveType::from_name(&coordinate.file_name()),
            &default_dir,
        )
    }

    fn read_archive(
        &self,
        bytes: &[u8],
        archive_type: Option<ArchiveType>,
        default_dir: &str,
    ) -> Result<DistributionFiles, RuntimeSynthesisError> {
        let archive_error = |reason: String| RuntimeSynthesisError::Archive {
            distribution: self.distribution.clone(),
            reason,
        };

        let archive_type = archive_type
            .or_else(|| ArchiveType::sniff(bytes))
            .ok_or_else(|| archive_error("unknown archive type".to_string()))?;
        let reader = ArchiveReader::new(bytes, archive_type);

        let dir = self.dist_dir.clone().unwrap_or_else(|| default_dir.to_string());
        let mut entries = reader.read_dir(&format!("{}/etc", dir)).map_err(archive_error)?;

        if entries.is_empty() && self.dist_dir.is_none() {
            // Fall back to whichever top-level directory holds the configuration
            let names = reader.entry_names().map_err(archive_error)?;
            let found = names
                .iter()
                .filter_map(|n| n.strip_suffix(&format!("/etc/{}", CONFIG_FILE)))
                .find(|prefix| !prefix.contains('/'))
                .map(str::to_string);
            if let Some(found) = found {
                log::debug!("Using distribution directory {} instead of {}", found, dir);
                entries = reader.read_dir(&format!("{}/etc", found)).map_err(archive_error)?;
            }
        }

        Ok(DistributionFiles::Archive(entries.into_iter().collect()))
    }
}

/// Load a properties file and the files it names in `${includes}` / `${optionals}`
///
/// Included values override the including file. Returns `None` when an
/// optional file is missing.
fn load_with_includes(
    files: &DistributionFiles,
    name: &str,
    mandatory: bool,
    stack: &mut Vec<String>,
) -> Result<Option<Properties>, RuntimeSynthesisError> {
    let content = match files.read(name) {
        Some(content) => content,
        None if mandatory && !stack.is_empty() => {
            return Err(RuntimeSynthesisError::ConfigNotFound {
                distribution: stack.last().cloned().unwrap_or_default(),
                path: files.describe(name),
            })
        }
        None => return Ok(None),
    };

    if stack.iter().any(|s| s == name) {
        return Err(RuntimeSynthesisError::Properties {
            path: files.describe(name),
            source: crate::properties::PropertiesError::Cycle(name.to_string()),
        });
    }

    let mut properties = Properties::parse(&String::from_utf8_lossy(&content)).map_err(|source| {
        RuntimeSynthesisError::Properties {
            path: files.describe(name),
            source,
        }
    })?;

    stack.push(name.to_string());
    for (directive, mandatory) in [(INCLUDES, true), (OPTIONALS, false)] {
        let Some(list) = properties.remove(directive) else {
            continue;
        };
        for include in include_names(&list) {
            match load_with_includes(files, &include, mandatory, stack)? {
                Some(included) => properties.extend(included),
                None => log::debug!("Skipping missing optional configuration {}", include),
            }
        }
    }
    stack.pop();

    Ok(Some(properties))
}

fn include_names(list: &str) -> Vec<String> {
    list.split(|c: char| c.is_whitespace() || c == ',')
        .map(|s| s.trim_matches('"'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_archive_extension(file_name: &str) -> &str {
    [".tar.gz", ".tgz", ".tar.bz2", ".tar.xz", ".tar", ".zip"]
        .iter()
        .find_map(|ext| file_name.strip_suffix(ext))
        .unwrap_or(file_name)
}

/// Specification version of a Java installation, from its `release` file
pub fn detect_java_version(java_home: &Path) -> Option<String> {
    let release = std::fs::read_to_string(java_home.join("release")).ok()?;
    let properties = Properties::parse(&release).ok()?;
    let version = properties.get("JAVA_VERSION")?.trim_matches('"');
    specification_version(version)
}

/// `1.8.0_292` -> `1.8`, `17.0.2` -> `17`
fn specification_version(version: &str) -> Option<String> {
    let mut parts = version.split(|c: char| c == '.' || c == '_' || c == '-' || c == '+');
    let first = parts.next().filter(|p| !p.is_empty())?;
    if first == "1" {
        parts.next().map(|minor| format!("1.{}", minor))
    } else {
        Some(first.to_string())
    }
}
