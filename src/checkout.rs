use anyhow::{Context, Result};
use git2::build::CheckoutBuilder;
use git2::{Oid, Repository};
use std::path::Path;

use crate::refs::StartPoint;

/// Turn a recovered object store into a working tree.
///
/// `worktree` must contain the recovered `.git/objects`. The start ref is
/// recreated locally (branches only; anything else becomes a detached HEAD)
/// and HEAD is force-checked-out.
pub fn materialize(worktree: &Path, start: &StartPoint) -> Result<()> {
    // init on an existing .git keeps its objects and only adds missing files
    let repo = Repository::init(worktree)
        .with_context(|| format!("Failed to initialise repository at {}", worktree.display()))?;

    let oid = Oid::from_bytes(start.hash.as_bytes()).context("Invalid start hash")?;
    let commit = repo
        .find_object(oid, None)
        .and_then(|obj| obj.peel_to_commit())
        .with_context(|| format!("Start object {} is not a recoverable commit", start.hash))?;

    match start.ref_name.as_deref() {
        Some(name) if name.starts_with("refs/heads/") => {
            repo.reference(name, commit.id(), true, "salvage: recovered")
                .with_context(|| format!("Failed to create {}", name))?;
            repo.set_head(name)
                .with_context(|| format!("Failed to point HEAD at {}", name))?;
        }
        _ => {
            repo.set_head_detached(commit.id())
                .context("Failed to detach HEAD")?;
        }
    }

    repo.checkout_head(Some(CheckoutBuilder::new().force()))
        .context("Failed to checkout HEAD")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use salvage_protocol::object::{encode, EntryMode, ObjectKind, Tree, TreeEntry};
    use salvage_protocol::LooseObjectStore;
    use std::fs;
    use tempfile::TempDir;

    fn put(
        store: &LooseObjectStore,
        kind: ObjectKind,
        body: &[u8],
    ) -> Result<salvage_protocol::ObjectHash> {
        let (hash, raw) = encode(kind, body)?;
        store.put(&hash, &raw)?;
        Ok(hash)
    }

    fn recovered_store(root: &Path) -> Result<salvage_protocol::ObjectHash> {
        let store = LooseObjectStore::new(root.join(".git"));
        let readme = put(&store, ObjectKind::Blob, b"recovered\n")?;
        let main_rs = put(&store, ObjectKind::Blob, b"fn main() {}\n")?;
        let src = put(
            &store,
            ObjectKind::Tree,
            &Tree {
                entries: vec![TreeEntry::new("main.rs", EntryMode::Blob, main_rs)],
            }
            .to_body(),
        )?;
        let root_tree = put(
            &store,
            ObjectKind::Tree,
            &Tree {
                entries: vec![
                    TreeEntry::new("README", EntryMode::Blob, readme),
                    TreeEntry::new("src", EntryMode::Tree, src),
                ],
            }
            .to_body(),
        )?;
        let commit_body = format!(
            "tree {root_tree}\nauthor A <a@example.com> 1700000000 +0000\n\
             committer A <a@example.com> 1700000000 +0000\n\ninitial\n"
        );
        put(&store, ObjectKind::Commit, commit_body.as_bytes())
    }

    #[test]
    fn test_materialize_branch() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let commit = recovered_store(temp_dir.path())?;

        materialize(
            temp_dir.path(),
            &StartPoint {
                ref_name: Some("refs/heads/main".into()),
                hash: commit,
            },
        )?;

        assert_eq!(fs::read_to_string(temp_dir.path().join("README"))?, "recovered\n");
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("src/main.rs"))?,
            "fn main() {}\n"
        );

        let repo = Repository::open(temp_dir.path())?;
        assert_eq!(repo.head()?.name(), Some("refs/heads/main"));
        Ok(())
    }

    #[test]
    fn test_materialize_detached() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let commit = recovered_store(temp_dir.path())?;

        materialize(
            temp_dir.path(),
            &StartPoint {
                ref_name: None,
                hash: commit,
            },
        )?;

        let repo = Repository::open(temp_dir.path())?;
        assert!(repo.head_detached()?);
        assert_eq!(repo.head()?.target().map(|o| o.to_string()), Some(commit.to_hex()));
        Ok(())
    }
}
