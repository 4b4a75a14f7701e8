//! Native handle tracking.
//!
//! Module code may pin objects through interop handles while it is being
//! activated. Those handles are invisible to reference counting from the
//! context's point of view, so the tracker records them and hands them to the
//! context's unload record, which force-releases survivors one per tick.
//!
//! Attribution is best-effort. Only allocations made while a context occupies
//! the active slot are captured; anything allocated outside that window is
//! counted as unattributed and left alone.

use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Interop handle that can keep module objects reachable.
pub trait NativeHandle: Send + Sync {
    /// Whether the handle still pins its target.
    fn is_allocated(&self) -> bool;

    /// Release the target. Freeing twice is a no-op.
    fn free(&self);

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Strength of a [`GcHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Normal,
    Pinned,
}

type Target = Arc<dyn Any + Send + Sync>;

/// Handle that keeps an arbitrary object alive until freed.
pub struct GcHandle {
    label: String,
    kind: HandleKind,
    target: Mutex<Option<Target>>,
}

impl GcHandle {
    pub fn new(label: impl Into<String>, target: Target, kind: HandleKind) -> Self {
        Self {
            label: label.into(),
            kind,
            target: Mutex::new(Some(target)),
        }
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn target(&self) -> Option<Target> {
        self.target.lock().clone()
    }
}

impl NativeHandle for GcHandle {
    fn is_allocated(&self) -> bool {
        self.target.lock().is_some()
    }

    fn free(&self) {
        let released = self.target.lock().take();
        drop(released);
    }

    fn describe(&self) -> String {
        format!("{} ({:?})", self.label, self.kind)
    }
}

impl fmt::Debug for GcHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcHandle")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("allocated", &self.is_allocated())
            .finish()
    }
}

#[derive(Default)]
struct TrackerState {
    depth: usize,
    active: Option<Uuid>,
    captured: Vec<Arc<dyn NativeHandle>>,
    unattributed: u64,
}

/// Observes handle allocations and attributes them to the active context.
#[derive(Default)]
pub struct HandleTracker {
    state: Mutex<TrackerState>,
}

impl HandleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a [`GcHandle`] through the tracked primitive.
    pub fn allocate(&self, label: impl Into<String>, target: Target, kind: HandleKind) -> Arc<GcHandle> {
        let scope = self.enter();
        let handle = Arc::new(GcHandle::new(label, target, kind));
        scope.complete(handle.clone());
        handle
    }

    /// Enter an allocation primitive. Nested scopes belong to the outermost
    /// one; only the outermost completion is reported.
    pub fn enter(&self) -> AllocationScope<'_> {
        self.state.lock().depth += 1;
        AllocationScope { tracker: self, open: true }
    }

    /// Route reported allocations to `context_id` until the subscription ends.
    pub fn subscribe(&self, context_id: Uuid) -> Subscription<'_> {
        let mut state = self.state.lock();
        if let Some(previous) = state.active.replace(context_id) {
            tracing::warn!(%previous, %context_id, "handle tracker slot was still occupied");
        }
        state.captured.clear();
        Subscription { tracker: self, context_id, open: true }
    }

    /// Current nesting depth of allocation primitives.
    pub fn depth(&self) -> usize {
        self.state.lock().depth
    }

    /// Allocations that could not be attributed to any context.
    pub fn unattributed(&self) -> u64 {
        self.state.lock().unattributed
    }

    fn leave(&self, handle: Option<Arc<dyn NativeHandle>>) {
        let mut state = self.state.lock();
        state.depth = state.depth.saturating_sub(1);
        if state.depth > 0 {
            return;
        }
        let Some(handle) = handle else { return };

        let active = state.active;
        match active {
            Some(context_id) => {
                tracing::info!(%context_id, handle = %handle.describe(), "intercepted handle allocation");
                state.captured.push(handle);
            }
            None => {
                state.unattributed += 1;
                tracing::debug!(handle = %handle.describe(), "handle allocated outside any load");
            }
        }
    }

    fn release_slot(&self, context_id: Uuid) -> Vec<Arc<dyn NativeHandle>> {
        let mut state = self.state.lock();
        if state.active == Some(context_id) {
            state.active = None;
            std::mem::take(&mut state.captured)
        } else {
            Vec::new()
        }
    }
}

/// An open allocation primitive. Dropping without completing reports nothing.
pub struct AllocationScope<'a> {
    tracker: &'a HandleTracker,
    open: bool,
}

impl AllocationScope<'_> {
    /// Close the scope with the handle it produced.
    pub fn complete(mut self, handle: Arc<dyn NativeHandle>) {
        self.open = false;
        self.tracker.leave(Some(handle));
    }
}

impl Drop for AllocationScope<'_> {
    fn drop(&mut self) {
        if self.open {
            self.tracker.leave(None);
        }
    }
}

/// Occupancy of the tracker's active slot.
pub struct Subscription<'a> {
    tracker: &'a HandleTracker,
    context_id: Uuid,
    open: bool,
}

impl Subscription<'_> {
    /// End the subscription and take the captured handles in allocation order.
    pub fn finish(mut self) -> Vec<Arc<dyn NativeHandle>> {
        self.open = false;
        self.tracker.release_slot(self.context_id)
    }
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        if self.open {
            self.tracker.release_slot(self.context_id);
        }
    }
}
