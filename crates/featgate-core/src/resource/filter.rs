//! LDAP-style filters (RFC 1960) as used by OSGi requirements.

use std::cmp::Ordering;
use std::fmt;

use featgate_version::Version;
use thiserror::Error;

use super::{AttributeValue, Attributes};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid filter \"{filter}\" at offset {offset}: {reason}")]
pub struct FilterError {
    pub filter: String,
    pub offset: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Approx,
    GreaterEq,
    LessEq,
}

/// A parsed filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal { attr: String, value: String },
    Approx { attr: String, value: String },
    GreaterEq { attr: String, value: String },
    LessEq { attr: String, value: String },
    Present(String),
    /// `attr=a*b*c`; an empty first or last part means a leading or trailing wildcard
    Substring { attr: String, parts: Vec<String> },
}

impl Filter {
    pub fn parse(filter: &str) -> Result<Self, FilterError> {
        let mut parser = Parser {
            input: filter,
            chars: filter.char_indices().collect(),
            pos: 0,
        };
        parser.skip_ws();
        let parsed = parser.parse_filter()?;
        parser.skip_ws();
        if parser.pos < parser.chars.len() {
            return Err(parser.error("unexpected trailing characters"));
        }
        Ok(parsed)
    }

    /// Equality filter on one attribute
    pub fn equal(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equal {
            attr: attr.into(),
            value: value.into(),
        }
    }

    /// Combine filters, collapsing a single operand
    pub fn all(mut filters: Vec<Filter>) -> Self {
        if filters.len() == 1 {
            filters.remove(0)
        } else {
            Filter::And(filters)
        }
    }

    /// Evaluate the filter against a set of attributes
    pub fn matches(&self, attributes: &Attributes) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.matches(attributes)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(attributes)),
            Filter::Not(filter) => !filter.matches(attributes),
            Filter::Present(attr) => lookup(attributes, attr).is_some(),
            Filter::Equal { attr, value } => compare_attr(attributes, attr, Op::Equal, value),
            Filter::Approx { attr, value } => compare_attr(attributes, attr, Op::Approx, value),
            Filter::GreaterEq { attr, value } => compare_attr(attributes, attr, Op::GreaterEq, value),
            Filter::LessEq { attr, value } => compare_attr(attributes, attr, Op::LessEq, value),
            Filter::Substring { attr, parts } => match lookup(attributes, attr) {
                Some(value) => substring_matches(value, parts),
                None => false,
            },
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(filters) => {
                write!(f, "(&")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            Filter::Or(filters) => {
                write!(f, "(|")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            Filter::Not(filter) => write!(f, "(!{})", filter),
            Filter::Equal { attr, value } => write!(f, "({}={})", attr, escape(value)),
            Filter::Approx { attr, value } => write!(f, "({}~={})", attr, escape(value)),
            Filter::GreaterEq { attr, value } => write!(f, "({}>={})", attr, escape(value)),
            Filter::LessEq { attr, value } => write!(f, "({}<={})", attr, escape(value)),
            Filter::Present(attr) => write!(f, "({}=*)", attr),
            Filter::Substring { attr, parts } => {
                let parts: Vec<String> = parts.iter().map(|p| escape(p)).collect();
                write!(f, "({}={})", attr, parts.join("*"))
            }
        }
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn lookup<'a>(attributes: &'a Attributes, attr: &str) -> Option<&'a AttributeValue> {
    attributes.get(attr).or_else(|| {
        attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(attr))
            .map(|(_, v)| v)
    })
}

fn compare_attr(attributes: &Attributes, attr: &str, op: Op, value: &str) -> bool {
    lookup(attributes, attr)
        .map(|actual| compare(actual, op, value))
        .unwrap_or(false)
}

fn compare(actual: &AttributeValue, op: Op, value: &str) -> bool {
    match actual {
        AttributeValue::String(s) => match op {
            Op::Approx => normalize(s) == normalize(value),
            _ => check(op, s.as_str().cmp(value)),
        },
        AttributeValue::Version(v) => match Version::parse(value) {
            Ok(expected) => check(op, v.cmp(&expected)),
            Err(_) => false,
        },
        AttributeValue::Long(l) => match value.trim().parse::<i64>() {
            Ok(expected) => check(op, l.cmp(&expected)),
            Err(_) => false,
        },
        AttributeValue::Double(d) => match value.trim().parse::<f64>() {
            Ok(expected) => d
                .partial_cmp(&expected)
                .map(|ord| check(op, ord))
                .unwrap_or(false),
            Err(_) => false,
        },
        AttributeValue::List(items) => items.iter().any(|item| compare(item, op, value)),
    }
}

fn check(op: Op, ordering: Ordering) -> bool {
    match op {
        Op::Equal | Op::Approx => ordering == Ordering::Equal,
        Op::GreaterEq => ordering != Ordering::Less,
        Op::LessEq => ordering != Ordering::Greater,
    }
}

fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn substring_matches(value: &AttributeValue, parts: &[String]) -> bool {
    let text = match value {
        AttributeValue::List(items) => return items.iter().any(|i| substring_matches(i, parts)),
        AttributeValue::String(s) => s.clone(),
        other => other.to_string(),
    };

    let Some((first, rest)) = parts.split_first() else {
        return true;
    };
    if !text.starts_with(first.as_str()) {
        return false;
    }

    let mut remaining = &text[first.len()..];
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for part in middle {
        match remaining.find(part.as_str()) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}

fn push_char(parts: &mut [String], c: char) {
    if let Some(part) = parts.last_mut() {
        part.push(c);
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &str) -> FilterError {
        FilterError {
            filter: self.input.to_string(),
            offset: self.chars.get(self.pos).map(|(i, _)| *i).unwrap_or(self.input.len()),
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), FilterError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected)))
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, FilterError> {
        self.expect('(')?;
        self.skip_ws();
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.parse_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.parse_list()?)
            }
            Some('!') => {
                self.pos += 1;
                self.skip_ws();
                Filter::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.skip_ws();
        self.expect(')')?;
        Ok(filter)
    }

    fn parse_list(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut filters = Vec::new();
        self.skip_ws();
        while self.peek() == Some('(') {
            filters.push(self.parse_filter()?);
            self.skip_ws();
        }
        if filters.is_empty() {
            return Err(self.error("empty filter list"));
        }
        Ok(filters)
    }

    fn parse_item(&mut self) -> Result<Filter, FilterError> {
        let mut attr = String::new();
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '<' | '>' | '~' | '(' | ')') {
                break;
            }
            attr.push(c);
            self.pos += 1;
        }
        let attr = attr.trim().to_string();
        if attr.is_empty() {
            return Err(self.error("missing attribute name"));
        }

        let op = match self.peek() {
            Some('=') => {
                self.pos += 1;
                Op::Equal
            }
            Some(c @ ('<' | '>' | '~')) => {
                self.pos += 1;
                self.expect('=')?;
                match c {
                    '<' => Op::LessEq,
                    '>' => Op::GreaterEq,
                    _ => Op::Approx,
                }
            }
            _ => return Err(self.error("expected operator")),
        };

        // Value parts separated by unescaped '*'
        let mut parts = vec![String::new()];
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated value")),
                Some(')') => break,
                Some('(') => return Err(self.error("unescaped '(' in value")),
                Some('\\') => {
                    self.pos += 1;
                    let c = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    push_char(&mut parts, c);
                    self.pos += 1;
                }
                Some('*') if op == Op::Equal => {
                    parts.push(String::new());
                    self.pos += 1;
                }
                Some(c) => {
                    push_char(&mut parts, c);
                    self.pos += 1;
                }
            }
        }

        if parts.len() == 1 {
            let value = parts.remove(0);
            return Ok(match op {
                Op::Equal => Filter::Equal { attr, value },
                Op::Approx => Filter::Approx { attr, value },
                Op::GreaterEq => Filter::GreaterEq { attr, value },
                Op::LessEq => Filter::LessEq { attr, value },
            });
        }

        if parts.len() == 2 && parts.iter().all(String::is_empty) {
            return Ok(Filter::Present(attr));
        }

        Ok(Filter::Substring { attr, parts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn attrs(entries: &[(&str, AttributeValue)]) -> Attributes {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<IndexMap<_, _>>()
    }

    fn string(s: &str) -> AttributeValue {
        AttributeValue::String(s.to_string())
    }

    #[test]
    fn test_parse_composite() {
        let filter = Filter::parse("(&(osgi.wiring.package=org.example)(version>=1.0.0)(!(version>=2.0.0)))").unwrap();
        match &filter {
            Filter::And(items) => {
                assert_eq!(items.len(), 3);
                assert!(matches!(items[2], Filter::Not(_)));
            }
            other => panic!("unexpected filter {:?}", other),
        }
    }

    #[test]
    fn test_version_comparison() {
        let filter = Filter::parse("(&(osgi.wiring.package=org.example)(version>=1.0.0)(!(version>=2.0.0)))").unwrap();
        let make = |v: Version| {
            attrs(&[
                ("osgi.wiring.package", string("org.example")),
                ("version", AttributeValue::Version(v)),
            ])
        };
        assert!(filter.matches(&make(Version::new(1, 5, 0))));
        assert!(!filter.matches(&make(Version::new(2, 0, 0))));
        assert!(!filter.matches(&make(Version::new(0, 9, 0))));
    }

    #[test]
    fn test_version_list_attribute() {
        let filter = Filter::parse("(&(osgi.ee=JavaSE)(version=1.8))").unwrap();
        let ee = attrs(&[
            ("osgi.ee", string("JavaSE")),
            (
                "version",
                AttributeValue::List(vec![
                    AttributeValue::Version(Version::new(1, 7, 0)),
                    AttributeValue::Version(Version::new(1, 8, 0)),
                ]),
            ),
        ]);
        assert!(filter.matches(&ee));
        assert!(!Filter::parse("(&(osgi.ee=JavaSE)(version=11))").unwrap().matches(&ee));
    }

    #[test]
    fn test_presence_and_substring() {
        let a = attrs(&[("objectClass", string("org.example.api.Service"))]);
        assert!(Filter::parse("(objectClass=*)").unwrap().matches(&a));
        assert!(!Filter::parse("(other=*)").unwrap().matches(&a));
        assert!(Filter::parse("(objectClass=org.example.*)").unwrap().matches(&a));
        assert!(Filter::parse("(objectClass=*api*Service)").unwrap().matches(&a));
        assert!(!Filter::parse("(objectClass=*impl*)").unwrap().matches(&a));
    }

    #[test]
    fn test_or_approx_and_long() {
        let a = attrs(&[("name", string("Hello World")), ("count", AttributeValue::Long(5))]);
        assert!(Filter::parse("(|(name=nope)(name~=helloworld))").unwrap().matches(&a));
        assert!(Filter::parse("(count<=5)").unwrap().matches(&a));
        assert!(!Filter::parse("(count>=6)").unwrap().matches(&a));
        assert!(Filter::parse("(NAME=Hello World)").unwrap().matches(&a));
    }

    #[test]
    fn test_escaped_characters() {
        let filter = Filter::parse(r"(name=a\*b\(c\))").unwrap();
        assert_eq!(filter, Filter::equal("name", "a*b(c)"));
        assert!(filter.matches(&attrs(&[("name", string("a*b(c)"))])));
        assert_eq!(filter.to_string(), r"(name=a\*b\(c\))");
    }

    #[test]
    fn test_invalid_filters() {
        assert!(Filter::parse("").is_err());
        assert!(Filter::parse("(a=b").is_err());
        assert!(Filter::parse("(&)").is_err());
        assert!(Filter::parse("(=b)").is_err());
        assert!(Filter::parse("(a=b))").is_err());
        assert!(Filter::parse("(a<b)").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        let text = "(&(osgi.ee=JavaSE)(|(version>=1.8)(!(version<=1.7))))";
        assert_eq!(Filter::parse(text).unwrap().to_string(), text);
    }
}
