#![allow(dead_code)]

use async_trait::async_trait;
use salvage::remote::{object_path, RemoteError, RemoteSource, RetryPolicy};
use salvage::TraversalOptions;
use salvage_protocol::object::{encode, Tree};
use salvage_protocol::{ObjectHash, ObjectKind, TreeEntry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory remote repository directory with fetch accounting.
#[derive(Default)]
pub struct MemoryRemote {
    files: Mutex<HashMap<String, Vec<u8>>>,
    fetches: Mutex<HashMap<String, usize>>,
    transient: Mutex<HashMap<String, u32>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps for `latency`, so concurrent fetches overlap.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn insert_file(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.into());
    }

    /// Serve `raw` as the compressed object for `hash`, whatever it contains.
    pub fn insert_object(&self, hash: &ObjectHash, raw: impl Into<Vec<u8>>) {
        self.insert_file(&object_path(hash), raw);
    }

    pub fn remove_object(&self, hash: &ObjectHash) {
        self.files.lock().unwrap().remove(&object_path(hash));
    }

    /// Fail the next `times` fetches of `hash` with a network error.
    pub fn fail_transiently(&self, hash: &ObjectHash, times: u32) {
        self.transient
            .lock()
            .unwrap()
            .insert(object_path(hash), times);
    }

    pub fn object_fetches(&self, hash: &ObjectHash) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(&object_path(hash))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_object_fetches(&self) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| path.starts_with("objects/"))
            .map(|(_, count)| count)
            .sum()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn add_raw(&self, kind: ObjectKind, body: &[u8]) -> ObjectHash {
        let (hash, raw) = encode(kind, body).unwrap();
        self.insert_object(&hash, raw);
        hash
    }

    pub fn add_blob(&self, content: &str) -> ObjectHash {
        self.add_raw(ObjectKind::Blob, content.as_bytes())
    }

    pub fn add_tree(&self, entries: Vec<TreeEntry>) -> ObjectHash {
        self.add_raw(ObjectKind::Tree, &Tree { entries }.to_body())
    }

    pub fn add_commit(
        &self,
        tree: ObjectHash,
        parents: &[ObjectHash],
        message: &str,
    ) -> ObjectHash {
        self.add_raw(ObjectKind::Commit, commit_body(tree, parents, message).as_bytes())
    }

    pub fn add_tag(&self, target: ObjectHash, kind: ObjectKind, name: &str) -> ObjectHash {
        let body = format!(
            "object {target}\ntype {kind}\ntag {name}\n\
             tagger T <t@example.com> 1700000000 +0000\n\nrelease\n"
        );
        self.add_raw(ObjectKind::Tag, body.as_bytes())
    }
}

pub fn commit_body(tree: ObjectHash, parents: &[ObjectHash], message: &str) -> String {
    let mut body = format!("tree {tree}\n");
    for parent in parents {
        body.push_str(&format!("parent {parent}\n"));
    }
    body.push_str("author A <a@example.com> 1700000000 +0000\n");
    body.push_str("committer A <a@example.com> 1700000000 +0000\n");
    body.push_str(&format!("\n{message}\n"));
    body
}

#[async_trait]
impl RemoteSource for MemoryRemote {
    async fn fetch_path(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        {
            let mut transient = self.transient.lock().unwrap();
            if let Some(left) = transient.get_mut(path) {
                if *left > 0 {
                    *left -= 1;
                    return Err(RemoteError::Network {
                        path: path.to_string(),
                        message: "connection reset by peer".into(),
                    });
                }
            }
        }

        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

pub fn options(workers: usize) -> TraversalOptions {
    TraversalOptions {
        workers,
        retry: fast_retry(3),
        ..TraversalOptions::default()
    }
}
