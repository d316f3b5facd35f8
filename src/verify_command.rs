use anyhow::{bail, Result};
use console::style;
use salvage_protocol::LooseObjectStore;
use std::path::Path;

use crate::verify::{self, StoreCheck};

/// Re-check every object recovered into `repo_path/.git` against its name.
///
/// Usage:
///   salvage verify
///   salvage verify ./recovered
pub fn run(repo_path: &Path) -> Result<StoreCheck> {
    let git_dir = repo_path.join(".git");
    if !git_dir.join("objects").is_dir() {
        bail!("No object store at {}", git_dir.display());
    }

    let check = verify::verify_store(&LooseObjectStore::new(&git_dir))?;

    if check.is_clean() {
        println!(
            "  {} {} objects verified",
            style("✓").green(),
            style(check.checked).bold()
        );
    } else {
        println!(
            "  {} {} of {} objects are corrupt",
            style("✗").red(),
            style(check.corrupt.len()).red().bold(),
            check.checked
        );
        for (hash, reason) in &check.corrupt {
            println!("    {} {}", hash, style(reason).dim());
        }
    }

    Ok(check)
}
