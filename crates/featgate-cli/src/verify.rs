//! Verify command - check that every selected feature resolves.

use anyhow::Result;
use clap::Args;
use console::style;
use featgate_core::{FeatureVerification, Reporter, Verbosity};
use std::path::PathBuf;

use crate::args::{RuntimeArgs, SourceArgs};
use crate::config;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub runtime: RuntimeArgs,

    /// Configuration file (default: featgate.toml in this or a parent directory)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Exit code 1 when features fail to resolve; setup problems are returned as errors
pub async fn execute(args: VerifyArgs, verbosity: Verbosity) -> Result<i32> {
    let mut config = config::resolve(args.config.as_deref())?;
    args.source.apply(&mut config);
    args.runtime.apply(&mut config);

    if verbosity > Verbosity::Quiet {
        eprintln!(
            "{} features from {} descriptor(s) against {}",
            style("Verifying").green().bold(),
            config.descriptors.len(),
            style(&config.distribution).cyan()
        );
    }

    let verification = FeatureVerification::new(config)
        .with_reporter(Reporter::new().with_verbosity(verbosity));

    match verification.run().await {
        Ok(summary) => {
            log::info!(
                "Verified {} feature(s) from {} repositories",
                summary.verified.len(),
                summary.repositories.len()
            );
            Ok(0)
        }
        Err(e) if e.is_verification_failure() => {
            log::debug!("{}", e);
            Ok(1)
        }
        Err(e) => Err(e.into()),
    }
}
