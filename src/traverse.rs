/*
Traversal engine: recovers every object reachable from a start commit.

Each hash moves through Discovered -> Fetching -> Decoding -> Verified ->
Stored -> Expanded. Only commits, trees and tags expand; blobs stop at Stored.

Scheduling
----------
The driver (`Traversal::run`) owns the frontier and keeps at most `workers`
tasks in a JoinSet. A worker fetches (or reads locally), decodes, verifies,
stores, then claims each referenced hash in the shared VisitedSet. Only the
hashes it wins go back to the driver as new frontier entries, so a hash is
dispatched at most once no matter how many parents reference it.

Failures are per object: the hash is recorded with its discovering parent and
its branch of the graph is abandoned. Only the start object is fatal.
*/

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dashmap::DashSet;
use salvage_protocol::object::{DecodedObject, ObjectKind, DEFAULT_MAX_OBJECT_SIZE};
use salvage_protocol::{LooseObjectStore, ObjectHash, WriteResult};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::observer::{ObjectEvent, ObjectSource, TracingObserver, TraversalObserver};
use crate::remote::{self, RemoteSource, RetryPolicy};
use crate::report::{FailedObject, FailureKind, RecoveryReport, SkippedSubmodule};
use crate::verify::decode_verified_limited;

#[derive(Debug, Clone)]
pub struct TraversalOptions {
    /// Maximum number of objects in flight.
    pub workers: usize,
    pub retry: RetryPolicy,
    /// Largest body size an object header may declare.
    pub max_object_size: u64,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            workers: 8,
            retry: RetryPolicy::default(),
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
        }
    }
}

/// Hashes that have been dispatched. `claim` is the single serialization
/// point for at-most-once processing.
#[derive(Debug, Default)]
pub struct VisitedSet(DashSet<ObjectHash>);

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the caller is the first to claim `hash`.
    pub fn claim(&self, hash: ObjectHash) -> bool {
        self.0.insert(hash)
    }

    pub fn contains(&self, hash: &ObjectHash) -> bool {
        self.0.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Stops dispatch of new objects; in-flight objects drain.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
struct Discovered {
    hash: ObjectHash,
    discovered_by: Option<ObjectHash>,
}

/// A stored (and, if applicable, expanded) object.
struct Processed {
    kind: ObjectKind,
    source: ObjectSource,
    discovered: Vec<Discovered>,
    duplicates: usize,
    submodules: Vec<SkippedSubmodule>,
}

pub struct Traversal<R: ?Sized> {
    remote: Arc<R>,
    store: LooseObjectStore,
    observer: Arc<dyn TraversalObserver>,
    options: TraversalOptions,
    cancel: CancelHandle,
}

impl<R: RemoteSource + ?Sized + 'static> Traversal<R> {
    pub fn new(remote: Arc<R>, store: LooseObjectStore, options: TraversalOptions) -> Self {
        Self {
            remote,
            store,
            observer: Arc::new(TracingObserver),
            options,
            cancel: CancelHandle::default(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TraversalObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Recover everything reachable from `start`, which must be a commit or
    /// an annotated tag.
    ///
    /// Returns `Err` only when the start object itself cannot be recovered
    /// or a worker task dies; per-object failures land in the report.
    pub async fn run(&self, start: ObjectHash) -> Result<RecoveryReport> {
        let workers = self.options.workers.max(1);
        let visited = Arc::new(VisitedSet::new());
        let worker = Worker {
            remote: Arc::clone(&self.remote),
            store: self.store.clone(),
            visited: Arc::clone(&visited),
            observer: Arc::clone(&self.observer),
            retry: self.options.retry.clone(),
            max_object_size: self.options.max_object_size,
        };
        let mut report = RecoveryReport::new(start);

        info!(%start, workers, "starting recovery");

        visited.claim(start);
        let seed = Discovered {
            hash: start,
            discovered_by: None,
        };
        let processed = match worker.clone().run(seed).await {
            Ok(processed) => processed,
            Err(failure) => bail!(
                "cannot recover start object {}: {} ({})",
                start,
                failure.detail,
                failure.kind
            ),
        };
        if !matches!(processed.kind, ObjectKind::Commit | ObjectKind::Tag) {
            bail!(
                "start object {} is a {}, expected a commit",
                start,
                processed.kind
            );
        }

        let mut frontier = VecDeque::new();
        absorb(&mut report, &mut frontier, processed);

        let mut tasks = JoinSet::new();
        loop {
            if self.cancel.is_cancelled() {
                if !frontier.is_empty() {
                    report.cancelled = true;
                    report.abandoned += frontier.len();
                    frontier.clear();
                }
            } else {
                while tasks.len() < workers {
                    let Some(item) = frontier.pop_front() else {
                        break;
                    };
                    tasks.spawn(worker.clone().run(item));
                }
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            match joined.context("traversal worker task failed")? {
                Ok(processed) => absorb(&mut report, &mut frontier, processed),
                Err(failure) => report.failures.push(failure),
            }
        }

        info!(
            %start,
            fetched = report.fetched,
            already_present = report.already_present,
            failed = report.failures.len(),
            visited = visited.len(),
            "recovery finished"
        );
        if report.cancelled {
            warn!(abandoned = report.abandoned, "recovery cancelled");
        }

        Ok(report)
    }
}

fn absorb(report: &mut RecoveryReport, frontier: &mut VecDeque<Discovered>, processed: Processed) {
    report.counts.record(processed.kind);
    match processed.source {
        ObjectSource::Remote => report.fetched += 1,
        ObjectSource::Local => report.already_present += 1,
    }
    report.duplicates_skipped += processed.duplicates;
    report.submodules.extend(processed.submodules);
    frontier.extend(processed.discovered);
}

struct Worker<R: ?Sized> {
    remote: Arc<R>,
    store: LooseObjectStore,
    visited: Arc<VisitedSet>,
    observer: Arc<dyn TraversalObserver>,
    retry: RetryPolicy,
    max_object_size: u64,
}

impl<R: ?Sized> Clone for Worker<R> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            store: self.store.clone(),
            visited: Arc::clone(&self.visited),
            observer: Arc::clone(&self.observer),
            retry: self.retry.clone(),
            max_object_size: self.max_object_size,
        }
    }
}

impl<R: RemoteSource + ?Sized> Worker<R> {
    async fn run(self, item: Discovered) -> Result<Processed, FailedObject> {
        let result = self.process(item).await;
        if let Err(failure) = &result {
            self.observer.on_object(
                &failure.hash,
                &ObjectEvent::Failed {
                    kind: failure.kind,
                    detail: failure.detail.clone(),
                },
            );
        }
        result
    }

    async fn process(&self, item: Discovered) -> Result<Processed, FailedObject> {
        let hash = item.hash;
        let fail = |kind: FailureKind, detail: String| FailedObject {
            hash,
            discovered_by: item.discovered_by,
            kind,
            detail,
        };

        let local = self
            .load_local(&hash)
            .map_err(|e| fail(FailureKind::Storage, format!("{e:#}")))?;

        let (decoded, source) = match local {
            Some(decoded) => (decoded, ObjectSource::Local),
            None => {
                let raw = remote::fetch_with_retry(&*self.remote, &hash, &self.retry)
                    .await
                    .map_err(|e| fail(FailureKind::from(&e), e.to_string()))?;
                let decoded = decode_verified_limited(&hash, &raw, self.max_object_size)
                    .map_err(|e| fail(e.kind(), e.to_string()))?;
                let written = self
                    .store
                    .put(&hash, &raw)
                    .map_err(|e| fail(FailureKind::Storage, format!("{e:#}")))?;
                if written == WriteResult::AlreadyPresent {
                    debug!(%hash, "object appeared locally while fetching");
                }
                (decoded, ObjectSource::Remote)
            }
        };

        let kind = decoded.kind();
        self.observer
            .on_object(&hash, &ObjectEvent::Stored { kind, source });

        let mut submodules = Vec::new();
        if let DecodedObject::Tree(tree) = &decoded {
            for entry in tree.gitlinks() {
                self.observer.on_object(
                    &entry.hash,
                    &ObjectEvent::SkippedSubmodule {
                        name: entry.name.clone(),
                    },
                );
                submodules.push(SkippedSubmodule {
                    hash: entry.hash,
                    name: entry.name.clone(),
                    tree: hash,
                });
            }
        }

        let mut discovered = Vec::new();
        let mut duplicates = 0;
        for reference in decoded.references() {
            if self.visited.claim(reference) {
                discovered.push(Discovered {
                    hash: reference,
                    discovered_by: Some(hash),
                });
            } else {
                duplicates += 1;
                self.observer
                    .on_object(&reference, &ObjectEvent::SkippedDuplicate);
            }
        }

        Ok(Processed {
            kind,
            source,
            discovered,
            duplicates,
            submodules,
        })
    }

    /// Decode a copy left by an earlier run. A copy that fails to decode or
    /// verify is discarded so the object is fetched again.
    fn load_local(&self, hash: &ObjectHash) -> Result<Option<DecodedObject>> {
        if !self.store.contains(hash) {
            return Ok(None);
        }
        let raw = self.store.read(hash)?;
        match decode_verified_limited(hash, &raw, self.max_object_size) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(fault) => {
                warn!(%hash, error = %fault, "discarding corrupt local copy");
                self.store.discard(hash)?;
                Ok(None)
            }
        }
    }
}
