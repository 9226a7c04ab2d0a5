//! Parser for OSGi manifest header clauses.
//!
//! `path1;path2;attr=value;typed:Version="1.0";directive:=value, path3`

use featgate_version::Version;
use indexmap::IndexMap;
use thiserror::Error;

use super::{AttributeValue, Attributes};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Invalid header clause \"{clause}\": {reason}")]
    InvalidClause { clause: String, reason: String },

    #[error("Missing required header {0}")]
    Missing(String),

    #[error("Invalid value for {header}: {reason}")]
    InvalidValue { header: String, reason: String },
}

/// One comma separated clause of a header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clause {
    pub paths: Vec<String>,
    pub attributes: Attributes,
    pub directives: IndexMap<String, String>,
}

impl Clause {
    pub fn directive(&self, name: &str) -> Option<&str> {
        self.directives.get(name).map(String::as_str)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Raw string form of an attribute
    pub fn attribute_str(&self, name: &str) -> Option<String> {
        self.attributes.get(name).map(|v| v.to_string())
    }

    pub fn is_optional(&self) -> bool {
        self.directive("resolution") == Some("optional")
    }
}

/// Parse a header value into clauses
pub fn parse_header(value: &str) -> Result<Vec<Clause>, HeaderError> {
    let mut clauses = Vec::new();

    for raw in split_unquoted(value, ',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let mut clause = Clause::default();
        for part in split_unquoted(raw, ';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            if let Some(idx) = find_unquoted(part, ":=") {
                let name = part[..idx].trim().to_string();
                let value = unquote(part[idx + 2..].trim());
                clause.directives.insert(name, value);
            } else if let Some(idx) = find_unquoted(part, "=") {
                let (name, kind) = match part[..idx].split_once(':') {
                    Some((name, kind)) => (name.trim(), Some(kind.trim())),
                    None => (part[..idx].trim(), None),
                };
                let value = unquote(part[idx + 1..].trim());
                let typed = typed_value(&value, kind).map_err(|reason| HeaderError::InvalidClause {
                    clause: raw.to_string(),
                    reason,
                })?;
                clause.attributes.insert(name.to_string(), typed);
            } else {
                if !clause.attributes.is_empty() || !clause.directives.is_empty() {
                    return Err(HeaderError::InvalidClause {
                        clause: raw.to_string(),
                        reason: format!("path \"{}\" after parameters", part),
                    });
                }
                clause.paths.push(unquote(part));
            }
        }

        if clause.paths.is_empty() {
            return Err(HeaderError::InvalidClause {
                clause: raw.to_string(),
                reason: "no path".to_string(),
            });
        }
        clauses.push(clause);
    }

    Ok(clauses)
}

fn typed_value(value: &str, kind: Option<&str>) -> Result<AttributeValue, String> {
    let kind = kind.unwrap_or("String");

    let scalar = |kind: &str, value: &str| -> Result<AttributeValue, String> {
        let value = value.trim();
        match kind {
            "String" => Ok(AttributeValue::String(value.to_string())),
            "Version" => Version::parse(value)
                .map(AttributeValue::Version)
                .map_err(|e| e.to_string()),
            "Long" => value
                .parse::<i64>()
                .map(AttributeValue::Long)
                .map_err(|e| format!("invalid Long \"{}\": {}", value, e)),
            "Double" => value
                .parse::<f64>()
                .map(AttributeValue::Double)
                .map_err(|e| format!("invalid Double \"{}\": {}", value, e)),
            other => Err(format!("unknown attribute type {}", other)),
        }
    };

    if let Some(rest) = kind.strip_prefix("List") {
        let element = rest
            .trim()
            .strip_prefix('<')
            .and_then(|r| r.strip_suffix('>'))
            .map(str::trim)
            .unwrap_or("String");
        let items = value
            .split(',')
            .filter(|item| !item.trim().is_empty())
            .map(|item| scalar(element, item))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(AttributeValue::List(items));
    }

    if kind == "String" {
        // Strings keep inner whitespace
        return Ok(AttributeValue::String(value.to_string()));
    }
    scalar(kind, value)
}

/// Split on `sep` outside of double quotes
fn split_unquoted(value: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                parts.push(&value[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}

fn find_unquoted(value: &str, needle: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (i, c) in value.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if !in_quotes && value[i..].starts_with(needle) {
            return Some(i);
        }
    }
    None
}

fn unquote(value: &str) -> String {
    let inner = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_package_clauses() {
        let clauses = parse_header(
            "org.example.api;org.example.spi;version=\"1.2.0\";uses:=\"org.osgi.framework,org.example.util\",org.example.util;version=1.0",
        )
        .unwrap();

        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].paths, vec!["org.example.api", "org.example.spi"]);
        assert_eq!(clauses[0].attribute_str("version").as_deref(), Some("1.2.0"));
        assert_eq!(clauses[0].directive("uses"), Some("org.osgi.framework,org.example.util"));
        assert_eq!(clauses[1].paths, vec!["org.example.util"]);
    }

    #[test]
    fn test_typed_attributes() {
        let clauses = parse_header(
            "osgi.ee;osgi.ee=\"JavaSE\";version:List<Version>=\"1.6,1.7,1.8\";rank:Long=3;name:String=x",
        )
        .unwrap();
        let clause = &clauses[0];

        assert_eq!(clause.attribute("osgi.ee"), Some(&AttributeValue::String("JavaSE".to_string())));
        assert_eq!(
            clause.attribute("version"),
            Some(&AttributeValue::List(vec![
                AttributeValue::Version(Version::new(1, 6, 0)),
                AttributeValue::Version(Version::new(1, 7, 0)),
                AttributeValue::Version(Version::new(1, 8, 0)),
            ]))
        );
        assert_eq!(clause.attribute("rank"), Some(&AttributeValue::Long(3)));
        assert_eq!(clause.attribute_str("name").as_deref(), Some("x"));
    }

    #[test]
    fn test_filter_directive_with_separators() {
        let clauses = parse_header(
            "osgi.ee;filter:=\"(&(osgi.ee=JavaSE)(version>=1.8))\",osgi.service;filter:=\"(objectClass=a.B)\";resolution:=optional",
        )
        .unwrap();
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].directive("filter"), Some("(&(osgi.ee=JavaSE)(version>=1.8))"));
        assert!(clauses[1].is_optional());
        assert!(!clauses[0].is_optional());
    }

    #[test]
    fn test_invalid_clauses() {
        assert!(parse_header("version=1.0").is_err());
        assert!(parse_header("a;version=1.0;b").is_err());
        assert!(parse_header("a;v:Version=x.y").is_err());
        assert!(parse_header("a;v:Unknown=1").is_err());
        assert!(parse_header("").unwrap().is_empty());
    }
}
