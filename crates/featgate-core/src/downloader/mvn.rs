//! Maven artifact coordinates.

use std::fmt;

const DEFAULT_EXTENSION: &str = "jar";

/// An artifact in a Maven repository
///
/// Parsed from `mvn:[repository!]groupId/artifactId[/version[/type[/classifier]]]`
/// or from the colon form `groupId:artifactId[:type[:classifier]]:version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MavenCoordinate {
    /// Repository given inline with `repository!`
    pub repository: Option<String>,
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub extension: String,
    pub classifier: Option<String>,
}

impl MavenCoordinate {
    pub fn new(group_id: &str, artifact_id: &str, version: &str) -> Self {
        Self {
            repository: None,
            group_id: group_id.to_string(),
            artifact_id: artifact_id.to_string(),
            version: version.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
            classifier: None,
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.to_string();
        self
    }

    /// Parse a `mvn:` URL
    pub fn parse_url(location: &str) -> Option<Self> {
        let rest = location.strip_prefix("mvn:")?;
        let (repository, rest) = match rest.split_once('!') {
            Some((repo, rest)) => (Some(repo.to_string()), rest),
            None => (None, rest),
        };

        let parts: Vec<&str> = rest.split('/').map(str::trim).collect();
        if parts.len() < 3 || parts.len() > 5 || parts[..3].iter().any(|p| p.is_empty()) {
            return None;
        }

        Some(Self {
            repository,
            group_id: parts[0].to_string(),
            artifact_id: parts[1].to_string(),
            version: parts[2].to_string(),
            extension: parts
                .get(3)
                .filter(|p| !p.is_empty())
                .unwrap_or(&DEFAULT_EXTENSION)
                .to_string(),
            classifier: parts.get(4).filter(|p| !p.is_empty()).map(|p| p.to_string()),
        })
    }

    /// Parse the colon separated form, using `default_extension` when no type is given
    pub fn parse_gav(coordinate: &str, default_extension: &str) -> Option<Self> {
        let parts: Vec<&str> = coordinate.split(':').map(str::trim).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return None;
        }

        let (extension, classifier) = match parts.len() {
            3 => (default_extension, None),
            4 => (parts[2], None),
            5 => (parts[2], Some(parts[3].to_string())),
            _ => return None,
        };

        Some(Self {
            repository: None,
            group_id: parts[0].to_string(),
            artifact_id: parts[1].to_string(),
            version: parts[parts.len() - 1].to_string(),
            extension: extension.to_string(),
            classifier,
        })
    }

    pub fn is_snapshot(&self) -> bool {
        self.version.ends_with("-SNAPSHOT")
    }

    /// File name in the repository layout
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                self.artifact_id, self.version, classifier, self.extension
            ),
            None => format!("{}-{}.{}", self.artifact_id, self.version, self.extension),
        }
    }

    /// Path relative to the repository root
    pub fn repository_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group_id.replace('.', "/"),
            self.artifact_id,
            self.version,
            self.file_name()
        )
    }
}

impl fmt::Display for MavenCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mvn:")?;
        if let Some(repository) = &self.repository {
            write!(f, "{}!", repository)?;
        }
        write!(f, "{}/{}/{}", self.group_id, self.artifact_id, self.version)?;
        match &self.classifier {
            Some(classifier) => write!(f, "/{}/{}", self.extension, classifier),
            None if self.extension != DEFAULT_EXTENSION => write!(f, "/{}", self.extension),
            None => Ok(()),
        }
    }
}
