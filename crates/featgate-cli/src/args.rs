//! Flags shared by the commands that load descriptors.

use clap::Args;
use featgate_core::{FailurePolicy, VerifyConfig};
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub struct SourceArgs {
    /// Features descriptor URI (can be used multiple times)
    #[arg(short = 'd', long = "descriptor", value_name = "URI", action = clap::ArgAction::Append)]
    pub descriptors: Vec<String>,

    /// Feature selection token, `!` excludes (can be used multiple times)
    #[arg(short = 'f', long = "feature", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub features: Vec<String>,

    /// Also consider features of repositories reached through nested references
    #[arg(long)]
    pub verify_transitive: bool,

    /// Remote Maven repository URL (can be used multiple times)
    #[arg(long = "maven-repository", value_name = "URL", action = clap::ArgAction::Append)]
    pub maven_repositories: Vec<String>,

    /// Local Maven repository (default: ~/.m2/repository)
    #[arg(long, value_name = "DIR")]
    pub local_repository: Option<PathBuf>,

    /// Download cache directory
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Maximum number of concurrent downloads
    #[arg(long, value_name = "N")]
    pub max_concurrent: Option<usize>,

    /// Disable progress output
    #[arg(long)]
    pub no_progress: bool,
}

impl SourceArgs {
    /// Command line values take precedence over the configuration file
    pub fn apply(&self, config: &mut VerifyConfig) {
        if !self.descriptors.is_empty() {
            config.descriptors = self.descriptors.clone();
        }
        if !self.features.is_empty() {
            config.features = self.features.clone();
        }
        if self.verify_transitive {
            config.verify_transitive = true;
        }
        if !self.maven_repositories.is_empty() {
            config.maven_repositories = self.maven_repositories.clone();
        }
        if let Some(dir) = &self.local_repository {
            config.local_repository = Some(dir.clone());
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        if let Some(n) = self.max_concurrent {
            config.max_concurrent_downloads = n;
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct RuntimeArgs {
    /// Feature deployed alongside every verified feature (can be used multiple times)
    #[arg(long, value_name = "FEATURE", action = clap::ArgAction::Append)]
    pub framework: Vec<String>,

    /// Base distribution: Maven coordinate, archive or directory
    #[arg(long, value_name = "COORDINATE")]
    pub distribution: Option<String>,

    /// Java specification version of the runtime (e.g. 1.8, 11)
    #[arg(long, value_name = "VERSION")]
    pub javase: Option<String>,

    /// Directory inside the distribution archive holding etc/
    #[arg(long, value_name = "DIR")]
    pub dist_dir: Option<String>,

    /// Properties file merged into the global properties
    #[arg(long, value_name = "FILE")]
    pub additional_metadata: Option<PathBuf>,

    /// When to fail: at the first failing feature or after verifying all of them
    #[arg(long, value_name = "first|end")]
    pub fail: Option<FailurePolicy>,
}

impl RuntimeArgs {
    pub fn apply(&self, config: &mut VerifyConfig) {
        if !self.framework.is_empty() {
            config.framework = self.framework.clone();
        }
        if let Some(distribution) = &self.distribution {
            config.distribution = distribution.clone();
        }
        if let Some(javase) = &self.javase {
            config.javase = Some(javase.clone());
        }
        if let Some(dist_dir) = &self.dist_dir {
            config.dist_dir = Some(dist_dir.clone());
        }
        if let Some(path) = &self.additional_metadata {
            config.additional_metadata = Some(path.clone());
        }
        if let Some(fail) = self.fail {
            config.fail = fail;
        }
    }
}
