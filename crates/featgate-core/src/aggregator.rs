//! Abort policy across feature verifications.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AggregateFailure, FeatureResolutionError};
use crate::verifier::{Resolution, ResolutionOutcome};

/// When a run gives up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failing feature
    First,
    /// Verify every feature, then fail if any failed
    #[default]
    End,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first" => Ok(FailurePolicy::First),
            "end" => Ok(FailurePolicy::End),
            other => Err(format!("unknown failure policy \"{}\" (expected first or end)", other)),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::First => write!(f, "first"),
            FailurePolicy::End => write!(f, "end"),
        }
    }
}

/// Collects outcomes and applies a [`FailurePolicy`]
#[derive(Debug)]
pub struct FailureAggregator {
    policy: FailurePolicy,
    passed: usize,
    failures: Vec<FeatureResolutionError>,
}

impl FailureAggregator {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            passed: 0,
            failures: Vec::new(),
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Record one outcome
    ///
    /// Under [`FailurePolicy::First`] a failure is handed back as is and the
    /// run must stop. Otherwise failures are kept for [`finish`](Self::finish).
    pub fn record(&mut self, outcome: ResolutionOutcome) -> Result<Option<Resolution>, FeatureResolutionError> {
        match outcome {
            Ok(resolution) => {
                self.passed += 1;
                Ok(Some(resolution))
            }
            Err(failure) if self.policy == FailurePolicy::First => Err(failure),
            Err(failure) => {
                self.failures.push(failure);
                Ok(None)
            }
        }
    }

    pub fn passed(&self) -> usize {
        self.passed
    }

    pub fn failures(&self) -> &[FeatureResolutionError] {
        &self.failures
    }

    /// Number of features passed, or every collected failure in verification order
    pub fn finish(self) -> Result<usize, AggregateFailure> {
        if self.failures.is_empty() {
            Ok(self.passed)
        } else {
            Err(AggregateFailure::new(self.failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailureCause, ResolverError};
    use crate::feature::FeatureId;

    fn success(name: &str) -> ResolutionOutcome {
        Ok(Resolution {
            feature: FeatureId::new(name, "1.0"),
            resources: Vec::new(),
        })
    }

    fn failure(name: &str) -> ResolutionOutcome {
        Err(FeatureResolutionError::new(
            FeatureId::new(name, "1.0"),
            FailureCause::Resolve(ResolverError::FeatureNotFound {
                name: "missing".to_string(),
                version: "0.0.0".to_string(),
            }),
            Default::default(),
            Default::default(),
        ))
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("first".parse::<FailurePolicy>().unwrap(), FailurePolicy::First);
        assert_eq!(" END ".parse::<FailurePolicy>().unwrap(), FailurePolicy::End);
        assert!("never".parse::<FailurePolicy>().is_err());
        assert_eq!(FailurePolicy::default(), FailurePolicy::End);
        assert_eq!(FailurePolicy::First.to_string(), "first");
    }

    #[test]
    fn test_first_returns_failure_unwrapped() {
        let mut aggregator = FailureAggregator::new(FailurePolicy::First);
        assert!(aggregator.record(success("a")).unwrap().is_some());

        let failure = aggregator.record(failure("b")).unwrap_err();
        assert_eq!(failure.feature.name, "b");
        assert!(aggregator.failures().is_empty());
    }

    #[test]
    fn test_end_collects_in_order() {
        let mut aggregator = FailureAggregator::new(FailurePolicy::End);
        assert!(aggregator.record(failure("a")).unwrap().is_none());
        assert!(aggregator.record(success("b")).unwrap().is_some());
        assert!(aggregator.record(failure("c")).unwrap().is_none());
        assert_eq!(aggregator.passed(), 1);

        let aggregate = aggregator.finish().unwrap_err();
        let names: Vec<&str> = aggregate.failures.iter().map(|f| f.feature.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_end_without_failures() {
        let mut aggregator = FailureAggregator::new(FailurePolicy::End);
        aggregator.record(success("a")).unwrap();
        assert_eq!(aggregator.finish().unwrap(), 1);
    }
}
