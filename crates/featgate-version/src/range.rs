//! Version ranges (`[1.0,2.0)`, `1.0`, ...)

use std::fmt;
use std::str::FromStr;

use crate::version::{Version, VersionError};

/// One end of a version range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    version: Version,
    is_inclusive: bool,
}

impl Bound {
    /// Create a new bound
    pub fn new(version: Version, is_inclusive: bool) -> Self {
        Bound {
            version,
            is_inclusive,
        }
    }

    /// Get the bound version
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Check if the bound is inclusive
    pub fn is_inclusive(&self) -> bool {
        self.is_inclusive
    }

    fn admits_from_below(&self, version: &Version) -> bool {
        if self.is_inclusive {
            version >= &self.version
        } else {
            version > &self.version
        }
    }

    fn admits_from_above(&self, version: &Version) -> bool {
        if self.is_inclusive {
            version <= &self.version
        } else {
            version < &self.version
        }
    }
}

/// An OSGi version range
///
/// A bare version (`1.0`) means "at least 1.0"; interval notation uses `[`/`]`
/// for inclusive and `(`/`)` for exclusive ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    floor: Bound,
    ceiling: Option<Bound>,
}

impl VersionRange {
    /// Range admitting every version
    pub fn any() -> Self {
        Self::at_least(Version::empty())
    }

    /// Range admitting `version` and everything above it
    pub fn at_least(version: Version) -> Self {
        Self {
            floor: Bound::new(version, true),
            ceiling: None,
        }
    }

    /// Range admitting exactly `version`
    pub fn exact(version: Version) -> Self {
        Self {
            floor: Bound::new(version.clone(), true),
            ceiling: Some(Bound::new(version, true)),
        }
    }

    /// Range with explicit bounds
    pub fn between(floor: Bound, ceiling: Option<Bound>) -> Self {
        Self { floor, ceiling }
    }

    /// Parse a range in OSGi notation
    pub fn parse(range: &str) -> Result<Self, VersionError> {
        let range = range.trim().trim_matches('"');
        let invalid = |reason: &str| VersionError::InvalidRange {
            range: range.to_string(),
            reason: reason.to_string(),
        };

        let first = match range.chars().next() {
            Some(c) => c,
            None => return Ok(Self::any()),
        };

        if first != '[' && first != '(' {
            return Ok(Self::at_least(Version::parse(range)?));
        }

        let last = range.chars().last().unwrap_or(first);
        if last != ']' && last != ')' {
            return Err(invalid("missing closing bracket"));
        }

        let inner = &range[1..range.len() - 1];
        let (low, high) = inner
            .split_once(',')
            .ok_or_else(|| invalid("expected two comma separated versions"))?;

        let floor = Bound::new(Version::parse(low)?, first == '[');
        let ceiling = Bound::new(Version::parse(high)?, last == ']');

        if ceiling.version < floor.version {
            return Err(invalid("floor is above ceiling"));
        }

        Ok(Self::between(floor, Some(ceiling)))
    }

    /// Get the lower bound
    pub fn floor(&self) -> &Bound {
        &self.floor
    }

    /// Get the upper bound, if any
    pub fn ceiling(&self) -> Option<&Bound> {
        self.ceiling.as_ref()
    }

    /// Check if a version falls inside the range
    pub fn includes(&self, version: &Version) -> bool {
        self.floor.admits_from_below(version)
            && self
                .ceiling
                .as_ref()
                .map(|c| c.admits_from_above(version))
                .unwrap_or(true)
    }

    /// Check if the range admits exactly one version
    pub fn is_exact(&self) -> bool {
        match &self.ceiling {
            Some(c) => self.floor.is_inclusive && c.is_inclusive && c.version == self.floor.version,
            None => false,
        }
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ceiling {
            None => write!(f, "{}", self.floor.version),
            Some(c) => write!(
                f,
                "{}{},{}{}",
                if self.floor.is_inclusive { '[' } else { '(' },
                self.floor.version,
                c.version,
                if c.is_inclusive { ']' } else { ')' }
            ),
        }
    }
}
