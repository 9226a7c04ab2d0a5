//! Choosing which features to verify.

use std::sync::Arc;

use regex::Regex;

use crate::error::VerifyError;
use crate::feature::Feature;
use crate::repository::RepositoryMap;

/// Matcher over `name/version` feature identities
///
/// Each token is literal except for `*`, which matches any sequence. A token
/// without `/` matches every version of the named feature. A token starting
/// with `!` excludes what it matches; with only exclusions, everything else
/// is selected.
#[derive(Debug, Clone)]
pub struct SelectionPattern {
    tokens: Vec<String>,
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl SelectionPattern {
    /// Compile tokens (each possibly comma separated); `None` when there is no token
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Option<Self>, VerifyError> {
        let tokens: Vec<String> = tokens
            .iter()
            .flat_map(|t| t.as_ref().split(','))
            .map(str::trim)
            .filter(|t| !t.is_empty() && *t != "!")
            .map(str::to_string)
            .collect();

        if tokens.is_empty() {
            return Ok(None);
        }

        let (excluded, included): (Vec<&str>, Vec<&str>) = tokens
            .iter()
            .map(String::as_str)
            .partition(|t| t.starts_with('!'));
        let excluded: Vec<&str> = excluded.iter().map(|t| t[1..].trim_start()).collect();
        let include = alternation(&included)?;
        let exclude = alternation(&excluded)?;

        Ok(Some(Self {
            tokens,
            include,
            exclude,
        }))
    }

    pub fn matches(&self, id: &str) -> bool {
        let included = self.include.as_ref().map(|r| r.is_match(id)).unwrap_or(true);
        let excluded = self.exclude.as_ref().map(|r| r.is_match(id)).unwrap_or(false);
        included && !excluded
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

fn alternation(tokens: &[&str]) -> Result<Option<Regex>, VerifyError> {
    if tokens.is_empty() {
        return Ok(None);
    }

    let alternatives: Vec<String> = tokens.iter().map(|t| token_pattern(t)).collect();
    let pattern = format!("^(?:{})$", alternatives.join("|"));
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| VerifyError::Config(format!("invalid feature selection {:?}: {}", tokens, e)))
}

fn token_pattern(token: &str) -> String {
    let mut pattern = regex::escape(token).replace(r"\*", ".*");
    if !token.contains('/') {
        pattern.push_str("/.*");
    }
    pattern
}

/// Candidate features for a run, in discovery order
///
/// Without `verify_transitive` only features declared directly by the
/// requested descriptors are candidates; with it, every loaded repository
/// contributes.
pub fn select_features(
    repositories: &RepositoryMap,
    requested: &[String],
    verify_transitive: bool,
    pattern: Option<&SelectionPattern>,
) -> Vec<Arc<Feature>> {
    let sources: Vec<_> = if verify_transitive {
        repositories.values().collect()
    } else {
        let mut seen = Vec::new();
        requested
            .iter()
            .map(|uri| uri.trim())
            .filter(|uri| {
                if seen.contains(uri) {
                    false
                } else {
                    seen.push(*uri);
                    true
                }
            })
            .filter_map(|uri| repositories.get(uri))
            .collect()
    };

    let selected: Vec<Arc<Feature>> = sources
        .into_iter()
        .flat_map(|r| r.features.iter())
        .filter(|f| {
            pattern
                .map(|p| p.matches(&f.id().to_string()))
                .unwrap_or(true)
        })
        .cloned()
        .collect();

    log::debug!(
        "Selected {} feature(s){}",
        selected.len(),
        pattern
            .map(|p| format!(" matching {}", p.tokens().join(", ")))
            .unwrap_or_default()
    );
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Repository;

    fn pattern(tokens: &[&str]) -> SelectionPattern {
        SelectionPattern::parse(tokens).unwrap().unwrap()
    }

    #[test]
    fn test_name_only_token_matches_any_version() {
        let p = pattern(&["core"]);
        assert!(p.matches("core/1.0.0"));
        assert!(p.matches("core/2.5.0.SNAPSHOT"));
        assert!(!p.matches("core-ext/1.0.0"));
        assert!(!p.matches("my-core/1.0.0"));
    }

    #[test]
    fn test_dot_is_literal() {
        let p = pattern(&["a.b"]);
        assert!(p.matches("a.b/1.0"));
        assert!(!p.matches("axb/1.0"));
    }

    #[test]
    fn test_metacharacters_are_literal() {
        let p = pattern(&["c++ (beta)"]);
        assert!(p.matches("c++ (beta)/1"));
        assert!(!p.matches("cc (beta)/1"));
        let p = pattern(&["x|y"]);
        assert!(!p.matches("x/1.0"));
    }

    #[test]
    fn test_wildcards_and_versions() {
        let p = pattern(&["camel-*"]);
        assert!(p.matches("camel-core/3.0"));
        assert!(!p.matches("camel/3.0"));

        let p = pattern(&["core/1.*"]);
        assert!(p.matches("core/1.2.0"));
        assert!(!p.matches("core/2.0.0"));

        let p = pattern(&["core/1.0.0"]);
        assert!(p.matches("core/1.0.0"));
        assert!(!p.matches("core/1.0.0.1"));
    }

    #[test]
    fn test_tokens_combine_and_split_on_commas() {
        let p = pattern(&["a, b", "c/2.0"]);
        assert_eq!(p.tokens(), &["a", "b", "c/2.0"]);
        assert!(p.matches("a/1"));
        assert!(p.matches("b/1"));
        assert!(p.matches("c/2.0"));
        assert!(!p.matches("c/1.0"));
    }

    #[test]
    fn test_exclusions() {
        let p = pattern(&["!core"]);
        assert!(!p.matches("core/1.0"));
        assert!(p.matches("web/1.0"));

        let p = pattern(&["camel-*", "!camel-test*"]);
        assert!(p.matches("camel-core/3.0"));
        assert!(!p.matches("camel-test-junit/3.0"));
        assert!(!p.matches("web/1.0"));

        let p = pattern(&["core, !core/1.*"]);
        assert!(p.matches("core/2.0"));
        assert!(!p.matches("core/1.5"));
    }

    #[test]
    fn test_empty_tokens_mean_no_pattern() {
        assert!(SelectionPattern::parse::<&str>(&[]).unwrap().is_none());
        assert!(SelectionPattern::parse(&[" ", ","]).unwrap().is_none());
        assert!(SelectionPattern::parse(&["!"]).unwrap().is_none());
    }

    fn repositories() -> RepositoryMap {
        let mut map = RepositoryMap::new();
        map.insert(
            "root".to_string(),
            Arc::new(
                Repository::new("root")
                    .with_repository("nested")
                    .with_feature(Feature::new("app", "1.0.0"))
                    .with_feature(Feature::new("app-web", "1.0.0")),
            ),
        );
        map.insert(
            "nested".to_string(),
            Arc::new(Repository::new("nested").with_feature(Feature::new("base", "2.0.0"))),
        );
        map
    }

    fn ids(features: &[Arc<Feature>]) -> Vec<String> {
        features.iter().map(|f| f.id().to_string()).collect()
    }

    #[test]
    fn test_direct_selection_excludes_nested_repositories() {
        let repos = repositories();
        let selected = select_features(&repos, &["root".to_string()], false, None);
        assert_eq!(ids(&selected), vec!["app/1.0.0", "app-web/1.0.0"]);
    }

    #[test]
    fn test_transitive_selection_includes_nested_repositories() {
        let repos = repositories();
        let selected = select_features(&repos, &["root".to_string()], true, None);
        assert_eq!(ids(&selected), vec!["app/1.0.0", "app-web/1.0.0", "base/2.0.0"]);
    }

    #[test]
    fn test_selection_with_pattern() {
        let repos = repositories();
        let p = pattern(&["app"]);
        let selected = select_features(&repos, &["root".to_string()], true, Some(&p));
        assert_eq!(ids(&selected), vec!["app/1.0.0"]);
    }

    #[test]
    fn test_selection_with_exclusion() {
        let repos = repositories();
        let p = pattern(&["!app"]);
        let selected = select_features(&repos, &["root".to_string()], true, Some(&p));
        assert_eq!(ids(&selected), vec!["app-web/1.0.0", "base/2.0.0"]);
    }

    #[test]
    fn test_selection_is_idempotent() {
        let repos = repositories();
        let p = pattern(&["*"]);
        let first = select_features(&repos, &["root".to_string(), "root".to_string()], false, Some(&p));
        let second = select_features(&repos, &["root".to_string()], false, Some(&p));
        assert_eq!(ids(&first), ids(&second));
    }
}
