use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use salvage::recover_command::{self, RecoverOptions};
use salvage::verify_command;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Recover a git repository from an exposed .git directory",
    long_about = None
)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Log every object instead of showing a spinner
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch every object reachable from HEAD and check it out
    Recover {
        /// URL of the exposed .git directory
        url: String,

        /// Target directory (defaults to a name derived from the URL)
        #[arg(value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Maximum number of objects fetched concurrently
        #[arg(short, long)]
        workers: Option<usize>,

        /// Retries per object for transient network errors
        #[arg(short, long)]
        retries: Option<u32>,

        /// Commit hash or full ref name to start from instead of HEAD
        #[arg(long)]
        start: Option<String>,

        /// Only recover objects, don't populate a working tree
        #[arg(long)]
        no_checkout: bool,
    },
    /// Re-check every recovered object against its hash
    Verify {
        /// Repository path (defaults to current directory)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "salvage=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Commands::Recover {
            url,
            dir,
            workers,
            retries,
            start,
            no_checkout,
        } => {
            let options = RecoverOptions {
                workers,
                retries,
                start,
                checkout: !no_checkout,
                verbose: args.verbose,
            };
            let report = recover_command::recover(&url, dir.as_deref(), options).await?;
            if !report.is_complete() {
                bail!(
                    "recovery incomplete: {} object(s) failed{}",
                    report.failures.len(),
                    if report.cancelled { ", cancelled" } else { "" }
                );
            }
        }
        Commands::Verify { path } => {
            let repo_path = match path {
                Some(p) => p,
                None => std::env::current_dir()?,
            };
            let check = verify_command::run(&repo_path)?;
            if !check.is_clean() {
                bail!("{} corrupt object(s)", check.corrupt.len());
            }
        }
    }

    Ok(())
}
