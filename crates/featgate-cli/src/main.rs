mod args;
mod config;
mod list;
mod progress;
mod verify;

use anyhow::Result;
use clap::{Parser, Subcommand};
use featgate_core::Verbosity;
use log::LevelFilter;
use std::process::ExitCode;

/// Exit code for setup errors (unreadable descriptors, broken distribution, bad flags)
const EXIT_FATAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "featgate")]
#[command(about = "Verify that features resolve against a runtime distribution before deployment")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print failures
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify that every selected feature resolves
    Verify(verify::VerifyArgs),

    /// List the features selected for verification
    List(list::ListArgs),
}

fn verbosity(args: &Args) -> Verbosity {
    if args.quiet {
        Verbosity::Quiet
    } else if args.verbose > 0 {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

fn init_logger(args: &Args) {
    let level = match (args.quiet, args.verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Warn,
        (false, 1) => LevelFilter::Info,
        (false, 2) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn run() -> Result<i32> {
    let args = Args::parse();
    init_logger(&args);
    let verbosity = verbosity(&args);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| anyhow::anyhow!("Failed to create async runtime: {}", e))?;

    match args.command {
        Commands::Verify(verify_args) => rt.block_on(verify::execute(verify_args, verbosity)),
        Commands::List(list_args) => rt.block_on(list::execute(list_args)),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("{} {}", console::style("Error:").red().bold(), e);
            for cause in e.chain().skip(1) {
                eprintln!("  Caused by: {}", cause);
            }
            ExitCode::from(EXIT_FATAL)
        }
    }
}
