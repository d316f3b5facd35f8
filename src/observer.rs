use salvage_protocol::{ObjectHash, ObjectKind};
use tracing::{debug, warn};

use crate::report::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectSource {
    Remote,
    /// Found in the local store from an earlier run.
    Local,
}

/// Per-object result handed to a [`TraversalObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectEvent {
    Stored { kind: ObjectKind, source: ObjectSource },
    Failed { kind: FailureKind, detail: String },
    SkippedDuplicate,
    SkippedSubmodule { name: String },
}

/// Receives one event per object outcome. Called from worker tasks, so
/// implementations must be cheap and thread-safe.
pub trait TraversalObserver: Send + Sync {
    fn on_object(&self, hash: &ObjectHash, event: &ObjectEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TraversalObserver for TracingObserver {
    fn on_object(&self, hash: &ObjectHash, event: &ObjectEvent) {
        match event {
            ObjectEvent::Stored { kind, source } => {
                debug!(%hash, %kind, ?source, "stored");
            }
            ObjectEvent::Failed { kind, detail } => {
                warn!(%hash, %kind, detail = %detail, "failed");
            }
            ObjectEvent::SkippedDuplicate => {
                debug!(%hash, "skipped duplicate");
            }
            ObjectEvent::SkippedSubmodule { name } => {
                debug!(%hash, name = %name, "skipped submodule");
            }
        }
    }
}
