//! Progress and result lines of a verification run.

use std::io::Write;
use std::sync::{Arc, Mutex};

use console::{style, Term};

use crate::error::{AggregateFailure, FeatureResolutionError};
use crate::feature::FeatureId;

/// Verbosity levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

/// Where report lines go
#[derive(Debug, Clone)]
enum Sink {
    Term(Term),
    Buffer(Arc<Mutex<Vec<u8>>>),
}

/// Writes run results to the terminal, mirrored to the log
///
/// Reporting never fails: write errors are ignored.
#[derive(Debug, Clone)]
pub struct Reporter {
    sink: Sink,
    verbosity: Verbosity,
}

impl Reporter {
    /// Reporter writing to stderr
    pub fn new() -> Self {
        Self {
            sink: Sink::Term(Term::stderr()),
            verbosity: Verbosity::Normal,
        }
    }

    /// Reporter writing unstyled lines into a shared buffer
    pub fn buffered(buffer: Arc<Mutex<Vec<u8>>>) -> Self {
        Self {
            sink: Sink::Buffer(buffer),
            verbosity: Verbosity::Normal,
        }
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    fn writeln(&self, styled: String, plain: &str) {
        match &self.sink {
            Sink::Term(term) => {
                let _ = writeln!(&*term, "{}", styled);
            }
            Sink::Buffer(buffer) => {
                if let Ok(mut buffer) = buffer.lock() {
                    let _ = writeln!(buffer, "{}", plain);
                }
            }
        }
    }

    /// A phase of the run is starting
    pub fn phase(&self, message: &str) {
        log::debug!("{}", message);
        if self.verbosity >= Verbosity::Verbose {
            self.writeln(style(message).dim().to_string(), message);
        }
    }

    pub fn success(&self, feature: &FeatureId) {
        let message = format!("Verification of feature {} succeeded", feature);
        log::info!("{}", message);
        if self.verbosity >= Verbosity::Normal {
            self.writeln(style(&message).green().to_string(), &message);
        }
    }

    pub fn failure(&self, failure: &FeatureResolutionError) {
        let message = failure.to_string();
        log::debug!("{}", message);
        self.writeln(
            format!("{} {}", style("Warning:").yellow().bold(), message),
            &format!("Warning: {}", message),
        );
    }

    /// Final pass/fail line
    pub fn summary(&self, passed: usize, failed: usize) {
        let message = format!(
            "{} of {} features verified successfully, {} failed",
            passed,
            passed + failed,
            failed
        );
        log::debug!("{}", message);
        let styled = if failed == 0 {
            style(&message).green().bold().to_string()
        } else {
            style(&message).red().bold().to_string()
        };
        self.writeln(styled, &message);
    }

    /// Diagnostic for a run aborted after collecting every failure
    pub fn aggregate(&self, aggregate: &AggregateFailure) {
        let mut message = aggregate.to_string();
        for failure in &aggregate.failures {
            message.push_str(&format!("\n{}", failure));
        }
        log::debug!("{}", message);
        self.writeln(
            format!("{} {}", style("Error:").red().bold(), message),
            &format!("Error: {}", message),
        );
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailureCause, ResolverError};

    fn captured() -> (Reporter, Arc<Mutex<Vec<u8>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        (Reporter::buffered(Arc::clone(&buffer)), buffer)
    }

    fn text(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8(buffer.lock().unwrap().clone()).unwrap()
    }

    fn failure() -> FeatureResolutionError {
        FeatureResolutionError::new(
            FeatureId::new("core", "1.0"),
            FailureCause::Resolve(ResolverError::MissingRequirement {
                resource: "mvn:org.example/core/1.0".to_string(),
                requirement: "osgi.wiring.package; (osgi.wiring.package=org.missing)".to_string(),
            }),
            ["file:/r1.json".to_string()].into_iter().collect(),
            ["mvn:org.example/core/1.0".to_string()].into_iter().collect(),
        )
    }

    #[test]
    fn test_success_and_summary_lines() {
        let (reporter, buffer) = captured();
        reporter.success(&FeatureId::new("core", "1.0"));
        reporter.summary(1, 0);

        let output = text(&buffer);
        assert!(output.contains("Verification of feature core/1.0 succeeded\n"));
        assert!(output.contains("1 of 1 features verified successfully, 0 failed"));
    }

    #[test]
    fn test_quiet_hides_successes_only() {
        let (reporter, buffer) = captured();
        let reporter = reporter.with_verbosity(Verbosity::Quiet);
        reporter.success(&FeatureId::new("core", "1.0"));
        reporter.phase("Loading descriptors");
        reporter.failure(&failure());

        let output = text(&buffer);
        assert!(!output.contains("succeeded"));
        assert!(!output.contains("Loading"));
        assert!(output.starts_with("Warning: Feature resolution failed for core/1.0"));
    }

    #[test]
    fn test_aggregate_diagnostic() {
        let (reporter, buffer) = captured();
        reporter.aggregate(&AggregateFailure::new(vec![failure()]));

        let output = text(&buffer);
        assert!(output.starts_with("Error: Verification failures (1 of the verified features failed)"));
        assert!(output.contains("Feature resolution failed for core/1.0\nMessage: Unable to resolve"));
        assert!(output.contains("org.missing)\nRepositories: {\n\tfile:/r1.json\n}"));
        assert!(output.contains("Resources: {\n\tmvn:org.example/core/1.0\n}"));
    }
}
