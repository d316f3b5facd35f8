use anyhow::{Context, Result};
use console::style;
use salvage_protocol::LooseObjectStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::checkout;
use crate::config::Config;
use crate::progress::ProgressObserver;
use crate::refs;
use crate::remote::HttpRemote;
use crate::report::{Outcome, RecoveryReport};
use crate::traverse::{CancelHandle, Traversal};

pub struct RecoverOptions {
    pub workers: Option<usize>,
    pub retries: Option<u32>,
    /// Hash or full ref name to start from instead of HEAD.
    pub start: Option<String>,
    pub checkout: bool,
    pub verbose: bool,
}

impl Default for RecoverOptions {
    fn default() -> Self {
        Self {
            workers: None,
            retries: None,
            start: None,
            checkout: true,
            verbose: false,
        }
    }
}

/// Recover the repository exposed at `url` (the URL of its `.git`
/// directory) into `dir`.
///
/// Usage:
///   salvage recover https://example.com/.git/
///   salvage recover https://example.com/.git/ out --workers 16
///   salvage recover https://example.com/.git/ --start refs/heads/dev --no-checkout
pub async fn recover(
    url: &str,
    dir: Option<&Path>,
    options: RecoverOptions,
) -> Result<RecoveryReport> {
    let config = Config::load()?.with_overrides(options.workers, options.retries);

    let target = match dir {
        Some(dir) => dir.to_path_buf(),
        None => default_target_dir(url)?,
    };
    let git_dir = target.join(".git");
    fs::create_dir_all(git_dir.join("objects"))
        .with_context(|| format!("Failed to create {}", git_dir.display()))?;

    let remote = Arc::new(HttpRemote::from_config(url, &config)?);
    let start = refs::resolve_start(&*remote, options.start.as_deref())
        .await
        .with_context(|| format!("Failed to resolve start point at {}", remote.base_url()))?;

    println!(
        "  {} {} ({})",
        style("Start").bold(),
        style(start.hash.short()).cyan(),
        start.ref_name.as_deref().unwrap_or("detached HEAD")
    );

    let progress = ProgressObserver::new(options.verbose)?;
    let traversal = Traversal::new(
        remote,
        LooseObjectStore::new(&git_dir),
        config.traversal_options(),
    )
    .with_observer(Arc::new(progress.clone()));

    let cancel = traversal.cancel_handle();
    let listener = cancel.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match interrupt(&listener) {
                Interrupt::Drain => eprintln!(
                    "  {} Interrupted: finishing in-flight objects, press Ctrl-C again to abort",
                    style("!").yellow()
                ),
                Interrupt::Abort => std::process::exit(130),
            }
        }
    });

    let report = traversal.run(start.hash).await;
    // Past this point a Ctrl-C exits immediately.
    cancel.cancel();
    progress.finish();
    let report = report?;

    print_summary(&report);

    if options.checkout {
        if report.is_complete() {
            checkout::materialize(&target, &start)?;
            println!(
                "  {} Checked out into {}",
                style("✓").green(),
                style(target.display()).bold()
            );
        } else {
            println!(
                "  {} Skipped checkout: recovery is partial",
                style("!").yellow()
            );
        }
    }

    Ok(report)
}

pub fn print_summary(report: &RecoveryReport) {
    let counts = &report.counts;
    match report.outcome() {
        Outcome::Complete => println!(
            "  {} Recovered {} objects ({} commits, {} trees, {} blobs, {} tags)",
            style("✓").green(),
            style(report.recovered()).bold(),
            counts.commits,
            counts.trees,
            counts.blobs,
            counts.tags
        ),
        Outcome::Partial => println!(
            "  {} Partial recovery: {} objects recovered, {} failed",
            style("✗").red(),
            style(report.recovered()).bold(),
            style(report.failures.len()).red().bold()
        ),
    }

    if report.already_present > 0 {
        println!(
            "    {} already present locally",
            style(report.already_present).dim()
        );
    }

    for submodule in &report.submodules {
        println!(
            "    {} submodule {} -> {} (not fetched)",
            style("-").dim(),
            submodule.name,
            submodule.hash.short()
        );
    }

    for failure in &report.failures {
        let parent = failure
            .discovered_by
            .map(|p| p.short())
            .unwrap_or_else(|| "start".to_string());
        println!(
            "    {} {} [{}] from {}: {}",
            style("✗").red(),
            failure.hash,
            failure.kind,
            parent,
            style(&failure.detail).dim()
        );
    }

    if report.cancelled {
        println!(
            "    {} cancelled with {} discovered objects unfetched",
            style("!").yellow(),
            report.abandoned
        );
    }
}

#[derive(Debug, PartialEq)]
enum Interrupt {
    /// Stop dispatching and let in-flight objects finish.
    Drain,
    /// Already draining; give up now.
    Abort,
}

fn interrupt(cancel: &CancelHandle) -> Interrupt {
    if cancel.is_cancelled() {
        Interrupt::Abort
    } else {
        cancel.cancel();
        Interrupt::Drain
    }
}

/// Directory name for a URL: the last path segment, minus `.git`.
pub fn default_target_dir(url: &str) -> Result<PathBuf> {
    let trimmed = url.trim_end_matches('/');
    let trimmed = trimmed
        .strip_suffix("/.git")
        .or_else(|| trimmed.strip_suffix(".git"))
        .unwrap_or(trimmed);
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);

    let name = without_scheme
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .with_context(|| format!("Cannot derive a directory name from {}", url))?;

    Ok(PathBuf::from(name.replace(':', "_")))
}
