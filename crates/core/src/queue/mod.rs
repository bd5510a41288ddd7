//! Multi-producer, single-consumer queue of deferred render-thread work.
//!
//! Producers (input, audio, timers) enqueue closures from any thread. Once per
//! frame the rendering thread drains the queue: uncategorised actions run in
//! enqueue order, followed by the latest action of every coalescing category.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crossbeam_queue::SegQueue;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Work executed on the rendering thread against the render context `C`.
pub type Action<C> = Box<dyn FnOnce(&mut C) -> Result<()> + Send + 'static>;

/// Queue configuration fixed at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Categories for which only the latest enqueued action survives a drain.
    #[serde(default)]
    pub coalescing: Vec<String>,
}

/// Outcome of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Actions that ran, including the failed ones.
    pub executed: usize,
    pub failed: usize,
}

struct Regions<C> {
    fifo: SegQueue<Action<C>>,
    // Values sit behind a mutex only to satisfy `DashMap`'s `Sync` bound; a
    // value is touched by one thread at a time.
    latest: DashMap<String, Mutex<Action<C>>>,
}

impl<C> Default for Regions<C> {
    fn default() -> Self {
        Self {
            fifo: SegQueue::new(),
            latest: DashMap::new(),
        }
    }
}

/// Deferred action queue with optional last-write-wins categories.
///
/// Enqueues take the region lock in shared mode, so producers only contend
/// on the lock-free FIFO and the sharded map. A drain takes it exclusively
/// just long enough to swap in empty regions, which means an enqueue lands
/// either entirely before or entirely after that drain.
///
/// Two producers racing on the same coalescing category keep whichever
/// insert the map stored last, not the logically newer one.
pub struct DeferredActionQueue<C> {
    coalescing: HashSet<String>,
    regions: RwLock<Regions<C>>,
}

impl<C> DeferredActionQueue<C> {
    pub fn new(config: &QueueConfig) -> Self {
        Self::with_coalescing(config.coalescing.iter().cloned())
    }

    pub fn with_coalescing<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            coalescing: categories.into_iter().map(Into::into).collect(),
            regions: RwLock::new(Regions::default()),
        }
    }

    pub fn is_coalescing(&self, category: &str) -> bool {
        self.coalescing.contains(category)
    }

    /// Queues `action`. Categories not configured as coalescing behave like
    /// no category at all.
    pub fn enqueue<F>(&self, category: Option<&str>, action: F)
    where
        F: FnOnce(&mut C) -> Result<()> + Send + 'static,
    {
        let action: Action<C> = Box::new(action);
        let regions = self.regions.read();
        match category {
            Some(category) if self.is_coalescing(category) => {
                regions.latest.insert(category.to_string(), Mutex::new(action));
            }
            _ => regions.fifo.push(action),
        }
    }

    /// Queues a one-shot action that is never dropped or reordered.
    pub fn push<F>(&self, action: F)
    where
        F: FnOnce(&mut C) -> Result<()> + Send + 'static,
    {
        self.enqueue(None, action);
    }

    /// Queues an action under `category`.
    pub fn set<F>(&self, category: &str, action: F)
    where
        F: FnOnce(&mut C) -> Result<()> + Send + 'static,
    {
        self.enqueue(Some(category), action);
    }

    /// Number of actions a drain started now would run.
    pub fn pending(&self) -> usize {
        let regions = self.regions.read();
        regions.fifo.len() + regions.latest.len()
    }

    /// Captures and clears both regions, then runs the captured actions on
    /// the calling thread. Must only be called from the rendering thread.
    ///
    /// A failing or panicking action is logged and counted; the rest of the
    /// drain still runs.
    pub fn drain_and_execute(&self, context: &mut C) -> DrainReport {
        let captured = std::mem::take(&mut *self.regions.write());
        let mut report = DrainReport::default();

        while let Some(action) = captured.fifo.pop() {
            run(action, context, None, &mut report);
        }
        for (category, action) in captured.latest {
            run(action.into_inner(), context, Some(&category), &mut report);
        }

        if report.executed > 0 {
            tracing::trace!(executed = report.executed, failed = report.failed, "drained actions");
        }
        report
    }
}

fn run<C>(action: Action<C>, context: &mut C, category: Option<&str>, report: &mut DrainReport) {
    report.executed += 1;
    match panic::catch_unwind(AssertUnwindSafe(|| action(context))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            report.failed += 1;
            tracing::error!(category, error = %err, "deferred action failed");
        }
        Err(payload) => {
            report.failed += 1;
            tracing::error!(category, panic = panic_message(&*payload), "deferred action panicked");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

impl<C> fmt::Debug for DeferredActionQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredActionQueue")
            .field("coalescing", &self.coalescing)
            .field("pending", &self.pending())
            .finish()
    }
}
