use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use salvage_protocol::ObjectHash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::observer::{ObjectEvent, TracingObserver, TraversalObserver};

#[derive(Debug, Default)]
struct Counters {
    stored: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

/// Spinner showing live counts; also forwards every event to tracing.
#[derive(Clone)]
pub struct ProgressObserver {
    pb: ProgressBar,
    counters: Arc<Counters>,
}

impl ProgressObserver {
    pub fn new(hidden: bool) -> Result<Self> {
        let pb = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")?
                .tick_strings(&["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"]),
        );
        pb.set_message("Resolving objects...");
        pb.enable_steady_tick(Duration::from_millis(80));

        Ok(Self {
            pb,
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }

    fn refresh(&self) {
        self.pb.set_message(format!(
            "{} objects recovered, {} failed, {} skipped",
            self.counters.stored.load(Ordering::Relaxed),
            self.counters.failed.load(Ordering::Relaxed),
            self.counters.skipped.load(Ordering::Relaxed),
        ));
    }
}

impl TraversalObserver for ProgressObserver {
    fn on_object(&self, hash: &ObjectHash, event: &ObjectEvent) {
        TracingObserver.on_object(hash, event);

        let counter = match event {
            ObjectEvent::Stored { .. } => &self.counters.stored,
            ObjectEvent::Failed { .. } => &self.counters.failed,
            ObjectEvent::SkippedDuplicate | ObjectEvent::SkippedSubmodule { .. } => {
                &self.counters.skipped
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.refresh();
    }
}
