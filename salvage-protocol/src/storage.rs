/// Local loose-object store.
/// Invariants:
/// - Layout is `<root>/objects/<hash[0:2]>/<hash[2:]>`, readable by ordinary git tooling.
/// - Stored bytes are exactly the compressed bytes handed to `put`; nothing is re-encoded.
/// - `put` is idempotent: an existing object is never rewritten.
use anyhow::{Context, Result};
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

use crate::hash::{ObjectHash, HEX_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    Written,
    AlreadyPresent,
}

#[derive(Debug, Clone)]
pub struct LooseObjectStore {
    root: PathBuf, // repository dir that contains objects/, e.g. <worktree>/.git
}

impl LooseObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    pub fn object_path(&self, hash: &ObjectHash) -> PathBuf {
        let hex = hash.to_hex();
        self.objects_dir().join(&hex[..2]).join(&hex[2..])
    }

    pub fn contains(&self, hash: &ObjectHash) -> bool {
        self.object_path(hash).is_file()
    }

    /// Store compressed bytes under `hash`. The caller has already verified
    /// that `raw` inflates to content hashing to `hash`.
    pub fn put(&self, hash: &ObjectHash, raw: &[u8]) -> Result<WriteResult> {
        let path = self.object_path(hash);
        if path.exists() {
            tracing::trace!(%hash, "object already present");
            return Ok(WriteResult::AlreadyPresent);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create object dir {}", parent.display()))?;
        }

        atomic_write(&path, raw).with_context(|| format!("write object {}", hash))?;
        Ok(WriteResult::Written)
    }

    /// Read the compressed bytes of a stored object.
    pub fn read(&self, hash: &ObjectHash) -> Result<Vec<u8>> {
        let path = self.object_path(hash);
        fs::read(&path).with_context(|| format!("read {}", path.display()))
    }

    /// Remove a stored object, e.g. one that failed verification. Missing
    /// objects are not an error.
    pub fn discard(&self, hash: &ObjectHash) -> Result<()> {
        let path = self.object_path(hash);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }

    /// Every hash currently stored, in no particular order.
    pub fn list(&self) -> Result<Vec<ObjectHash>> {
        let dir = self.objects_dir();
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut out = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(2).max_depth(2) {
            let entry = entry.with_context(|| format!("walk {}", dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let prefix = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|s| s.to_str());
            let rest = path.file_name().and_then(|s| s.to_str());

            // skip temp / junk and non-object dirs such as pack/ and info/
            let (Some(prefix), Some(rest)) = (prefix, rest) else {
                continue;
            };
            if rest.starts_with('.') || prefix.len() + rest.len() != HEX_LEN {
                continue;
            }

            if let Ok(hash) = ObjectHash::from_hex(&format!("{prefix}{rest}")) {
                out.push(hash);
            }
        }

        Ok(out)
    }
}

fn atomic_write(final_path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = tmp_path_for(final_path);

    let mut f = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp_path)
        .with_context(|| format!("open temp object file {:?}", tmp_path))?;

    f.write_all(bytes)
        .with_context(|| format!("write temp object file {:?}", tmp_path))?;

    f.sync_all()
        .with_context(|| format!("sync temp object file {:?}", tmp_path))?;

    drop(f);

    fs::rename(&tmp_path, final_path)
        .with_context(|| format!("rename {:?} -> {:?}", tmp_path, final_path))?;

    Ok(())
}

fn tmp_path_for(final_path: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let file_name = final_path.file_name().unwrap_or_default().to_string_lossy();
    final_path.with_file_name(format!(".{}.tmp.{}.{}", file_name, std::process::id(), nanos))
}
