//! `META-INF/MANIFEST.MF` main section.

use indexmap::IndexMap;

use super::HeaderError;

pub const SYMBOLIC_NAME: &str = "Bundle-SymbolicName";
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Headers of a jar manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    headers: IndexMap<String, String>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the main section of a manifest
    ///
    /// Continuation lines start with a single space; the main section ends at
    /// the first empty line.
    pub fn parse(bytes: &[u8]) -> Result<Self, HeaderError> {
        let content = String::from_utf8_lossy(bytes);
        let mut headers: IndexMap<String, String> = IndexMap::new();
        let mut last: Option<String> = None;

        for line in content.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }

            if let Some(rest) = line.strip_prefix(' ') {
                match last.as_ref().and_then(|name| headers.get_mut(name)) {
                    Some(value) => value.push_str(rest),
                    None => {
                        return Err(HeaderError::InvalidValue {
                            header: MANIFEST_PATH.to_string(),
                            reason: "continuation line without header".to_string(),
                        })
                    }
                }
                continue;
            }

            let (name, value) = line.split_once(':').ok_or_else(|| HeaderError::InvalidValue {
                header: MANIFEST_PATH.to_string(),
                reason: format!("invalid line \"{}\"", line),
            })?;
            let name = name.trim().to_string();
            headers.insert(name.clone(), value.strip_prefix(' ').unwrap_or(value).to_string());
            last = Some(name);
        }

        Ok(Self { headers })
    }

    pub fn from_headers(headers: IndexMap<String, String>) -> Self {
        Self { headers }
    }

    /// Header value; names are case-insensitive
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    /// Symbolic name without its parameters
    pub fn symbolic_name(&self) -> Option<&str> {
        self.get(SYMBOLIC_NAME)
            .map(|v| v.split(';').next().unwrap_or(v).trim())
            .filter(|v| !v.is_empty())
    }

    pub fn is_bundle(&self) -> bool {
        self.symbolic_name().is_some()
    }
}
