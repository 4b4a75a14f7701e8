//! The lifecycle registry.
//!
//! Single owner of every module between registration and reclamation: active
//! load contexts, unloading and orphaned records, the host, the sweepers and
//! the injected clock and collectors. Calls must be serialized by the caller;
//! nothing here is meant to run concurrently with itself.

use std::sync::Arc;

use super::boundary::contain;
use super::clock::{Clock, SystemClock};
use super::collector::Collectors;
use super::context::{Assembly, UnloadEvents};
use super::error::LifecycleError;
use super::handles::HandleTracker;
use super::host::{InstanceKind, LoadInterceptor, ModuleHost};
use super::identity::ModuleIdentity;
use super::image::{DebugSymbols, ModuleImage};
use super::load::{LoadContext, LoadContextManager, LoadState};
use super::unload::{TickReport, UnloadContextManager, UnloadRecord, DEFAULT_ORPHAN_THRESHOLD};
use crate::sweep::{AssemblySet, SweepRegistry, Sweeper};
use crate::telemetry::{self, LifecycleSpan, SpanExt};

pub struct LifecycleRegistry {
    loads: LoadContextManager,
    unloads: UnloadContextManager,
    host: Box<dyn ModuleHost>,
    sweepers: SweepRegistry,
    collectors: Collectors,
    clock: Arc<dyn Clock>,
    handles: Arc<HandleTracker>,
    events: UnloadEvents,
}

impl LifecycleRegistry {
    pub fn new(host: Box<dyn ModuleHost>) -> Self {
        let events = UnloadEvents::new();
        Self {
            loads: LoadContextManager::new(events.clone()),
            unloads: UnloadContextManager::new(DEFAULT_ORPHAN_THRESHOLD),
            host,
            sweepers: SweepRegistry::new(),
            collectors: Collectors::default(),
            clock: Arc::new(SystemClock),
            handles: Arc::new(HandleTracker::new()),
            events,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_collectors(mut self, collectors: Collectors) -> Self {
        self.collectors = collectors;
        self
    }

    pub fn with_sweepers(mut self, sweepers: SweepRegistry) -> Self {
        self.sweepers = sweepers;
        self
    }

    pub fn with_handle_tracker(mut self, handles: Arc<HandleTracker>) -> Self {
        self.handles = handles;
        self
    }

    pub fn with_orphan_threshold(mut self, threshold: u32) -> Self {
        self.set_orphan_threshold(threshold);
        self
    }

    /// Records already unloading are judged against the new threshold on
    /// their next poll.
    pub fn set_orphan_threshold(&mut self, threshold: u32) {
        self.unloads.set_orphan_threshold(threshold);
    }

    pub fn add_sweeper(&mut self, sweeper: Arc<dyn Sweeper>) {
        self.sweepers.register(sweeper);
    }

    /// Register a compiled module under `identity`.
    pub fn register(
        &mut self,
        identity: ModuleIdentity,
        assembly_name: impl Into<String>,
        image: ModuleImage,
        symbols: Option<DebugSymbols>,
    ) -> Result<&LoadContext, LifecycleError> {
        let assembly_name = assembly_name.into();
        let guid = identity.guid().to_string();

        if self.loads.contains_guid(&guid)
            || self.loads.contains_location(identity.location_token())
            || self.loads.contains_assembly(&assembly_name)
            || self.unloads.contains_guid(&guid)
            || self.unloads.contains_assembly(&assembly_name)
        {
            tracing::warn!(%guid, assembly = %assembly_name, "refusing duplicate registration");
            return Err(LifecycleError::DuplicateIdentity { guid, assembly_name });
        }

        tracing::info!(
            %guid,
            assembly = %assembly_name,
            version = %identity.version(),
            size = image.len(),
            symbols = symbols.is_some(),
            "module registered"
        );
        telemetry::record_module_registered();
        Ok(self.loads.insert(identity, assembly_name, image, symbols))
    }

    /// Interception entry for the host loader.
    pub fn try_resolve(&mut self, location_token: &str) -> Option<Arc<Assembly>> {
        self.loads.try_resolve(location_token)
    }

    /// Activate one registered module through the host.
    ///
    /// Returns `Ok(false)` when activation did not produce a live plugin
    /// instance; the context has been force-unloaded by then. Errors are
    /// reserved for misuse.
    pub fn trigger_load(&mut self, guid: &str) -> Result<bool, LifecycleError> {
        let span = LifecycleSpan::trigger_load(guid);
        let _enter = span.enter();

        let result = self.trigger_load_inner(guid);
        span.record_result(&result);
        if let Ok(loaded) = result {
            span.record("loaded", loaded);
            telemetry::record_load_outcome(loaded);
        }
        result
    }

    fn trigger_load_inner(&mut self, guid: &str) -> Result<bool, LifecycleError> {
        let ctx = self
            .loads
            .get(guid)
            .ok_or_else(|| LifecycleError::UnknownModule(guid.to_string()))?;

        if ctx.state() != LoadState::Ready {
            let err = LifecycleError::InvalidStateTransition {
                guid: guid.to_string(),
                operation: "trigger_load",
                actual: ctx.state(),
                expected: LoadState::Ready,
            };
            tracing::error!(error = %err, "load aborted");
            return Err(err);
        }

        if self.host.active_instance(guid).is_some() {
            let err = LifecycleError::AlreadyInstantiated { guid: guid.to_string() };
            tracing::error!(error = %err, "load aborted");
            return Err(err);
        }

        let identity = ctx.identity().clone();
        let context_id = ctx.context_id();
        if let Some(ctx) = self.loads.get_mut(guid) {
            ctx.transition(LoadState::Loading);
        }

        let tracker = Arc::clone(&self.handles);
        let subscription = tracker.subscribe(context_id);
        let host = &mut self.host;
        let loads = &mut self.loads;
        let outcome = contain(|| host.activate(std::slice::from_ref(&identity), loads));
        let captured = subscription.finish();

        let state = match self.loads.get_mut(guid) {
            Some(ctx) => {
                ctx.append_handles(captured);
                Some(ctx.state())
            }
            None => None,
        };

        let failure = match (outcome, state) {
            (Err(panic), _) => Some(format!("activation panicked: {panic}")),
            (Ok(Err(e)), _) => Some(format!("activation failed: {e}")),
            (Ok(Ok(())), None) => Some("context unloaded during activation".to_string()),
            (Ok(Ok(())), Some(LoadState::Loading)) => {
                Some("host never requested the module image".to_string())
            }
            (Ok(Ok(())), Some(LoadState::Loaded)) => match self.host.active_instance(guid).map(|i| i.kind()) {
                Some(InstanceKind::Plugin) => None,
                Some(InstanceKind::Foreign) => {
                    Some("attached instance does not implement the plugin capability".to_string())
                }
                None => Some("no instance was attached".to_string()),
            },
            (Ok(Ok(())), Some(other)) => Some(format!("unexpected state {other:?} after activation")),
        };

        match failure {
            None => {
                tracing::info!(guid, context_id = %context_id, "module loaded");
                Ok(true)
            }
            Some(reason) => {
                tracing::warn!(guid, %reason, "load failed, unloading");
                self.request_unload(guid);
                self.dispatch_unload_events();
                Ok(false)
            }
        }
    }

    /// Ask one module's context to begin unloading.
    pub fn unload(&mut self, guid: &str) -> Result<(), LifecycleError> {
        let span = LifecycleSpan::unload(guid);
        let _enter = span.enter();

        let result = if self.request_unload(guid) {
            self.dispatch_unload_events();
            Ok(())
        } else {
            Err(LifecycleError::UnknownModule(guid.to_string()))
        };
        span.record_result(&result);
        result
    }

    /// Ask every active context to begin unloading. Idempotent; callers keep
    /// ticking until the records drain.
    pub fn unload_all(&mut self) -> usize {
        let requested = self.loads.request_unload_all();
        let disposed = self.dispatch_unload_events();
        if disposed > 0 {
            tracing::info!(requested, disposed, "unloaded all modules");
        }
        disposed
    }

    fn request_unload(&self, guid: &str) -> bool {
        match self.loads.get(guid) {
            Some(ctx) => {
                ctx.context().begin_unload();
                true
            }
            None => false,
        }
    }

    /// Dispose every context that has signalled it is unloading.
    pub fn dispatch_unload_events(&mut self) -> usize {
        let mut disposed = 0;
        for context_id in self.events.drain() {
            match self.loads.remove_by_context_id(context_id) {
                Some(ctx) => {
                    self.dispose(ctx);
                    disposed += 1;
                }
                None => tracing::debug!(%context_id, "unload notification for untracked context"),
            }
        }
        disposed
    }

    fn dispose(&mut self, ctx: LoadContext) {
        let guid = ctx.identity().guid().to_string();
        match ctx.state() {
            LoadState::Loaded => tracing::info!(%guid, "context unloading"),
            LoadState::Ready => tracing::warn!(%guid, "context unloading, module was never loaded"),
            LoadState::Loading => tracing::warn!(%guid, "context unloading, module did not load"),
            state => tracing::warn!(%guid, ?state, "context unloading in unexpected state"),
        }
        let unload_start = self.clock.now();

        if let Some(mut instance) = self.host.detach(&guid) {
            let released = contain(move || {
                let released = instance.unload();
                drop(instance);
                released
            });
            match released {
                Ok(true) => {}
                Ok(false) => tracing::warn!(%guid, "module refused to unload, context might not unload properly"),
                Err(panic) => tracing::warn!(%guid, %panic, "module unload panicked, context might not unload properly"),
            }
        }

        let owned = AssemblySet::from_context(ctx.context());
        let swept = self.sweepers.sweep_all(&owned);
        telemetry::record_sweep(swept.removed, swept.failures.len());

        let residue = ctx.dispose();
        tracing::debug!(%guid, handles = residue.native_handles.len(), "ownership moved to unload record");
        self.unloads.insert(UnloadRecord::new(residue, unload_start));
        telemetry::record_lifecycle_sizes(self.loads.len(), self.unloads.unloading_len(), self.unloads.orphaned_len());
    }

    /// One poll step. Dispatches pending notifications first.
    pub fn process_tick(&mut self) -> TickReport {
        self.dispatch_unload_events();
        if self.unloads.is_idle() {
            return TickReport::default();
        }

        let span = LifecycleSpan::tick();
        let _enter = span.enter();
        let report = self.unloads.process_tick(&self.collectors, self.clock.as_ref());
        telemetry::record_tick(&report);
        telemetry::record_lifecycle_sizes(self.loads.len(), self.unloads.unloading_len(), self.unloads.orphaned_len());
        report
    }

    pub fn state(&self, guid: &str) -> Option<LoadState> {
        self.loads.get(guid).map(LoadContext::state)
    }

    pub fn is_active(&self, guid: &str) -> bool {
        self.loads.contains_guid(guid)
    }

    pub fn is_unloading(&self, guid: &str) -> bool {
        self.unloads.is_unloading(guid)
    }

    pub fn is_orphaned(&self, guid: &str) -> bool {
        self.unloads.is_orphaned(guid)
    }

    /// Whether `guid` is held anywhere: active, unloading or orphaned.
    pub fn is_tracked(&self, guid: &str) -> bool {
        self.is_active(guid) || self.unloads.contains_guid(guid)
    }

    /// Whether an active or unloading module uses `assembly_name`.
    pub fn contains_assembly(&self, assembly_name: &str) -> bool {
        self.loads.contains_assembly(assembly_name) || self.unloads.contains_assembly(assembly_name)
    }

    pub fn active_count(&self) -> usize {
        self.loads.len()
    }

    pub fn unloading_count(&self) -> usize {
        self.unloads.unloading_len()
    }

    pub fn orphaned_count(&self) -> usize {
        self.unloads.orphaned_len()
    }

    pub fn load_contexts(&self) -> &LoadContextManager {
        &self.loads
    }

    pub fn unload_contexts(&self) -> &UnloadContextManager {
        &self.unloads
    }

    pub fn host(&self) -> &dyn ModuleHost {
        self.host.as_ref()
    }

    pub fn host_mut(&mut self) -> &mut dyn ModuleHost {
        self.host.as_mut()
    }

    pub fn handle_tracker(&self) -> &Arc<HandleTracker> {
        &self.handles
    }

    pub fn sweepers(&self) -> &SweepRegistry {
        &self.sweepers
    }
}
