//! Java properties files with `${...}` variable substitution.
//!
//! This covers the subset used by runtime distributions and metadata files:
//! `key=value`, `key: value` and `key value` separators, `#`/`!` comments,
//! backslash line continuations and escapes (`\t`, `\n`, `\uXXXX`, ...).

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use thiserror::Error;

/// Errors that can occur when loading or substituting properties
#[derive(Debug, Error)]
pub enum PropertiesError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid unicode escape in line {line}")]
    InvalidEscape { line: usize },

    #[error("Expression cycle detected while substituting {0}")]
    Cycle(String),

    #[error("Unterminated expression in value of {0}")]
    Unterminated(String),
}

/// Ordered set of string properties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: IndexMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and parse a properties file
    pub fn load(path: &Path) -> Result<Self, PropertiesError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse properties from a string
    pub fn parse(content: &str) -> Result<Self, PropertiesError> {
        let mut entries = IndexMap::new();
        let mut logical = String::new();
        let mut start_line = 0;

        for (idx, raw) in content.lines().enumerate() {
            let line = if logical.is_empty() {
                let trimmed = raw.trim_start();
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                    continue;
                }
                start_line = idx + 1;
                trimmed
            } else {
                raw.trim_start()
            };

            if ends_with_continuation(line) {
                logical.push_str(&line[..line.len() - 1]);
                continue;
            }

            logical.push_str(line);
            let (key, value) = split_entry(&logical, start_line)?;
            entries.insert(key, value);
            logical.clear();
        }

        if !logical.is_empty() {
            let (key, value) = split_entry(&logical, start_line)?;
            entries.insert(key, value);
        }

        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.shift_remove(key)
    }

    /// Copy every entry of `other` into this set, overwriting existing keys
    pub fn extend(&mut self, other: Properties) {
        self.entries.extend(other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every `${name}` reference in every value
    ///
    /// Nested expressions such as `${jre-${java.specification.version}}` are
    /// resolved innermost first. Undefined variables expand to an empty string.
    pub fn substitute(&mut self) -> Result<(), PropertiesError> {
        let keys: Vec<String> = self.entries.keys().cloned().collect();
        let mut resolved = IndexMap::with_capacity(keys.len());

        for key in keys {
            let mut stack = vec![key.clone()];
            let value = self.entries.get(&key).cloned().unwrap_or_default();
            let substituted = self.substitute_value(&key, &value, &mut stack)?;
            resolved.insert(key, substituted);
        }

        self.entries = resolved;
        Ok(())
    }

    fn substitute_value(
        &self,
        key: &str,
        value: &str,
        stack: &mut Vec<String>,
    ) -> Result<String, PropertiesError> {
        let mut current = value.to_string();

        loop {
            let Some((start, end)) = innermost_expression(&current) else {
                if current.contains("${") {
                    return Err(PropertiesError::Unterminated(key.to_string()));
                }
                return Ok(current);
            };

            let name = current[start + 2..end].to_string();
            if stack.contains(&name) {
                return Err(PropertiesError::Cycle(name));
            }

            let replacement = match self.entries.get(&name) {
                Some(raw) => {
                    stack.push(name.clone());
                    let value = self.substitute_value(&name, raw, stack)?;
                    stack.pop();
                    value
                }
                None => {
                    log::trace!("Undefined variable ${{{}}} in {}", name, key);
                    String::new()
                }
            };

            current.replace_range(start..=end, &replacement);
        }
    }
}

impl FromIterator<(String, String)> for Properties {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Find the first `${...}` that contains no other expression
fn innermost_expression(value: &str) -> Option<(usize, usize)> {
    let bytes = value.as_bytes();
    let mut open: Option<usize> = None;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            open = Some(i);
            i += 2;
            continue;
        }
        if bytes[i] == b'}' {
            if let Some(start) = open {
                return Some((start, i));
            }
        }
        i += 1;
    }

    None
}

fn ends_with_continuation(line: &str) -> bool {
    let trailing = line.bytes().rev().take_while(|b| *b == b'\\').count();
    trailing % 2 == 1
}

fn split_entry(line: &str, line_no: usize) -> Result<(String, String), PropertiesError> {
    let chars: Vec<char> = line.chars().collect();
    let mut key_end = chars.len();
    let mut escaped = false;

    for (i, c) in chars.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' | '\u{c}' => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let key: String = chars[..key_end].iter().collect();
    let mut rest = chars[key_end..].iter().peekable();

    // Skip whitespace, at most one separator, then whitespace again
    while matches!(rest.peek(), Some(' ' | '\t' | '\u{c}')) {
        rest.next();
    }
    if matches!(rest.peek(), Some('=' | ':')) {
        rest.next();
    }
    while matches!(rest.peek(), Some(' ' | '\t' | '\u{c}')) {
        rest.next();
    }
    let value: String = rest.collect();

    Ok((unescape(&key, line_no)?, unescape(&value, line_no)?))
}

fn unescape(input: &str, line_no: usize) -> Result<String, PropertiesError> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .and_then(char::from_u32)
                    .ok_or(PropertiesError::InvalidEscape { line: line_no })?;
                out.push(code);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }

    Ok(out)
}
