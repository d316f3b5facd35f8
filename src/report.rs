use salvage_protocol::{ObjectHash, ObjectKind};
use std::fmt;

use crate::remote::RemoteError;

/// Why one object could not be recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Transport error that outlived its retries.
    Network,
    NotFound,
    /// Non-retryable HTTP status other than 404.
    Http,
    Decode,
    Integrity,
    /// Local filesystem error while reading or writing the store.
    Storage,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Network => "network",
            FailureKind::NotFound => "not-found",
            FailureKind::Http => "http",
            FailureKind::Decode => "decode",
            FailureKind::Integrity => "integrity",
            FailureKind::Storage => "storage",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&RemoteError> for FailureKind {
    fn from(err: &RemoteError) -> Self {
        match err {
            RemoteError::NotFound(_) => FailureKind::NotFound,
            RemoteError::Network { .. } => FailureKind::Network,
            RemoteError::Status { .. } => FailureKind::Http,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedObject {
    pub hash: ObjectHash,
    /// The commit, tree or tag that referenced this hash. `None` for the start object.
    pub discovered_by: Option<ObjectHash>,
    pub kind: FailureKind,
    pub detail: String,
}

/// A gitlink entry: recorded, never fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSubmodule {
    pub hash: ObjectHash,
    pub name: String,
    pub tree: ObjectHash,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindCounts {
    pub commits: usize,
    pub trees: usize,
    pub blobs: usize,
    pub tags: usize,
}

impl KindCounts {
    pub fn record(&mut self, kind: ObjectKind) {
        match kind {
            ObjectKind::Commit => self.commits += 1,
            ObjectKind::Tree => self.trees += 1,
            ObjectKind::Blob => self.blobs += 1,
            ObjectKind::Tag => self.tags += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.commits + self.trees + self.blobs + self.tags
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    Partial,
}

/// Everything a run learned about the object graph.
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub start: ObjectHash,
    /// Objects fetched from the remote and written to the store.
    pub fetched: usize,
    /// Objects already in the local store from an earlier run.
    pub already_present: usize,
    /// References to hashes that were already dispatched.
    pub duplicates_skipped: usize,
    pub counts: KindCounts,
    pub submodules: Vec<SkippedSubmodule>,
    pub failures: Vec<FailedObject>,
    /// Set when a cancel request left discovered hashes unprocessed.
    pub cancelled: bool,
    pub abandoned: usize,
}

impl RecoveryReport {
    pub fn new(start: ObjectHash) -> Self {
        Self {
            start,
            fetched: 0,
            already_present: 0,
            duplicates_skipped: 0,
            counts: KindCounts::default(),
            submodules: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
            abandoned: 0,
        }
    }

    /// Objects now present and verified in the local store.
    pub fn recovered(&self) -> usize {
        self.fetched + self.already_present
    }

    pub fn outcome(&self) -> Outcome {
        if self.failures.is_empty() && !self.cancelled {
            Outcome::Complete
        } else {
            Outcome::Partial
        }
    }

    pub fn is_complete(&self) -> bool {
        self.outcome() == Outcome::Complete
    }

    pub fn failures_of(&self, kind: FailureKind) -> impl Iterator<Item = &FailedObject> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }
}
