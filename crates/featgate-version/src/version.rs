//! Version parsing and ordering

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

/// Error type for version and range parsing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version string \"{0}\"")]
    InvalidVersion(String),
    #[error("Invalid version range \"{range}\": {reason}")]
    InvalidRange { range: String, reason: String },
}

lazy_static! {
    // Strict OSGi syntax: numeric segments, qualifier limited to [A-Za-z0-9_-]
    static ref VERSION_RE: Regex = Regex::new(
        r"^(\d+)(?:\.(\d+)(?:\.(\d+)(?:\.([A-Za-z0-9_-]+))?)?)?$"
    ).unwrap();

    // Maven-style versions such as 1.0-SNAPSHOT or 2.3.1.Final-redhat-1
    static ref LENIENT_RE: Regex = Regex::new(
        r"^(\d+)(?:[._-](\d+)(?:[._-](\d+))?)?(?:[._-]?(.+))?$"
    ).unwrap();

    static ref QUALIFIER_CLEANUP_RE: Regex = Regex::new(r"[^A-Za-z0-9_-]").unwrap();
}

/// An OSGi version: `major.minor.micro.qualifier`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub micro: u64,
    pub qualifier: String,
}

impl Version {
    /// Create a version without qualifier
    pub fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    /// Create a version with a qualifier
    pub fn with_qualifier(major: u64, minor: u64, micro: u64, qualifier: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: qualifier.into(),
        }
    }

    /// The `0.0.0` version
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a version using strict OSGi syntax
    ///
    /// An empty string parses to `0.0.0`, as in bundle manifests where the
    /// version header is absent.
    pub fn parse(version: &str) -> Result<Self, VersionError> {
        let version = version.trim();
        if version.is_empty() {
            return Ok(Self::empty());
        }

        let caps = VERSION_RE
            .captures(version)
            .ok_or_else(|| VersionError::InvalidVersion(version.to_string()))?;

        let segment = |idx: usize| -> Result<u64, VersionError> {
            match caps.get(idx) {
                Some(m) => m
                    .as_str()
                    .parse::<u64>()
                    .map_err(|_| VersionError::InvalidVersion(version.to_string())),
                None => Ok(0),
            }
        };

        Ok(Self {
            major: segment(1)?,
            minor: segment(2)?,
            micro: segment(3)?,
            qualifier: caps.get(4).map(|m| m.as_str().to_string()).unwrap_or_default(),
        })
    }

    /// Parse a Maven-style version, cleaning it up into a valid OSGi version
    ///
    /// `1.0-SNAPSHOT` becomes `1.0.0.SNAPSHOT`. Anything that does not start
    /// with a number is kept entirely as the qualifier of `0.0.0`.
    pub fn parse_lenient(version: &str) -> Self {
        let version = version.trim();
        if let Ok(v) = Self::parse(version) {
            return v;
        }

        match LENIENT_RE.captures(version) {
            Some(caps) => {
                let segment = |idx: usize| {
                    caps.get(idx)
                        .and_then(|m| m.as_str().parse::<u64>().ok())
                        .unwrap_or(0)
                };
                let qualifier = caps
                    .get(4)
                    .map(|m| QUALIFIER_CLEANUP_RE.replace_all(m.as_str(), "_").to_string())
                    .unwrap_or_default();
                Self::with_qualifier(segment(1), segment(2), segment(3), qualifier)
            }
            None => Self::with_qualifier(
                0,
                0,
                0,
                QUALIFIER_CLEANUP_RE.replace_all(version, "_").to_string(),
            ),
        }
    }

    /// The first version of the next minor line (`1.2.3` -> `1.3.0`)
    pub fn next_minor(&self) -> Self {
        Self::new(self.major, self.minor + 1, 0)
    }

    /// The first version of the next major line (`1.2.3` -> `2.0.0`)
    pub fn next_major(&self) -> Self {
        Self::new(self.major + 1, 0, 0)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.micro.cmp(&other.micro))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}
