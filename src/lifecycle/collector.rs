//! Collector ports.
//!
//! The host owns the collectors; this crate only asks them to run a full
//! cycle. Two collectors may be present (the managed one and a VM-level one the
//! host embeds) and an object can be rooted in either, so both run every cycle.

use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A garbage collector the host exposes.
pub trait Collector: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Run a full, blocking collection cycle including pending finalizers.
    fn collect(&self);
}

/// Collector whose only roots are deferred drops.
///
/// Objects handed to [`FinalizerQueue::defer`] stay alive until the next
/// cycle, the way finalizable objects survive until their finalizer has run.
pub struct FinalizerQueue {
    name: String,
    pending: Mutex<Vec<Box<dyn Any + Send>>>,
}

impl FinalizerQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Keep `value` alive until the next collection.
    pub fn defer(&self, value: Box<dyn Any + Send>) {
        self.pending.lock().push(value);
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Collector for FinalizerQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self) {
        // Finalizers may defer more work; those survive until the next cycle.
        let finalized = std::mem::take(&mut *self.pending.lock());
        drop(finalized);
    }
}

/// Wall time spent in each collector during one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleTimings {
    pub managed: Duration,
    pub secondary: Option<Duration>,
}

/// The managed collector plus an optional secondary collector.
#[derive(Clone)]
pub struct Collectors {
    managed: Arc<dyn Collector>,
    secondary: Option<Arc<dyn Collector>>,
}

impl Collectors {
    pub fn new(managed: Arc<dyn Collector>) -> Self {
        Self { managed, secondary: None }
    }

    pub fn with_secondary(mut self, secondary: Arc<dyn Collector>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// Run the managed collector, then the secondary one.
    pub fn full_cycle(&self) -> CycleTimings {
        let managed = timed(self.managed.as_ref());
        let secondary = self.secondary.as_ref().map(|c| timed(c.as_ref()));
        CycleTimings { managed, secondary }
    }
}

impl Default for Collectors {
    fn default() -> Self {
        Self::new(Arc::new(FinalizerQueue::new("managed")))
    }
}

fn timed(collector: &dyn Collector) -> Duration {
    let start = Instant::now();
    collector.collect();
    let elapsed = start.elapsed();
    tracing::debug!(
        collector = collector.name(),
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "collection cycle finished"
    );
    elapsed
}
