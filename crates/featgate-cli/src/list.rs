//! List command - show the features a verification run would check.

use anyhow::Result;
use clap::Args;
use console::style;
use featgate_core::FeatureVerification;
use std::path::PathBuf;

use crate::args::SourceArgs;
use crate::config;
use crate::progress;

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Configuration file (default: featgate.toml in this or a parent directory)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also print the repositories that were loaded
    #[arg(long)]
    pub repositories: bool,
}

pub async fn execute(args: ListArgs) -> Result<i32> {
    let mut config = config::resolve(args.config.as_deref())?;
    args.source.apply(&mut config);

    let spinner = progress::spinner(!args.source.no_progress, "Loading features descriptors...");
    let selection = FeatureVerification::new(config).select().await;
    spinner.finish_and_clear();
    let selection = selection?;

    if args.repositories {
        println!("{}", style("Repositories").yellow().bold());
        for uri in selection.repositories.uris() {
            println!("  {}", uri);
        }
        println!();
    }

    println!("{}", style("Features").yellow().bold());
    for feature in &selection.features {
        match &feature.description {
            Some(description) => println!(
                "  {} {}",
                style(feature.id()).green(),
                style(description).dim()
            ),
            None => println!("  {}", style(feature.id()).green()),
        }
    }

    if selection.features.is_empty() {
        eprintln!("{} No feature matches the selection", style("Warning:").yellow().bold());
    }
    Ok(0)
}
