//! Load contexts and the table of active ones.
//!
//! A load context owns everything about an active module: the image until it is
//! materialized, the execution context, the materialized assembly and the
//! handles captured during activation. At `Disposed` it is dismantled and its
//! residue moves to an unload record.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use uuid::Uuid;

use super::context::{Assembly, ExecutionContext, UnloadEvents};
use super::handles::NativeHandle;
use super::host::LoadInterceptor;
use super::identity::ModuleIdentity;
use super::image::{DebugSymbols, ModuleImage};

/// Lifecycle state of a load context. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LoadState {
    Ready,
    Loading,
    Loaded,
    Disposed,
}

/// An active module.
pub struct LoadContext {
    identity: ModuleIdentity,
    assembly_name: String,
    state: LoadState,
    image: Option<ModuleImage>,
    symbols: Option<DebugSymbols>,
    context: Arc<ExecutionContext>,
    assembly: Option<Arc<Assembly>>,
    native_handles: Vec<Arc<dyn NativeHandle>>,
}

impl std::fmt::Debug for LoadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadContext")
            .field("identity", &self.identity)
            .field("assembly_name", &self.assembly_name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// What a disposed load context leaves behind for its unload record.
pub(crate) struct Residue {
    pub identity: ModuleIdentity,
    pub assembly_name: String,
    pub context: Weak<ExecutionContext>,
    pub native_handles: Vec<Arc<dyn NativeHandle>>,
}

impl LoadContext {
    fn new(
        identity: ModuleIdentity,
        assembly_name: String,
        image: ModuleImage,
        symbols: Option<DebugSymbols>,
        events: UnloadEvents,
    ) -> Self {
        let context = ExecutionContext::new(identity.guid(), events);
        Self {
            identity,
            assembly_name,
            state: LoadState::Ready,
            image: Some(image),
            symbols,
            context,
            assembly: None,
            native_handles: Vec::new(),
        }
    }

    pub fn identity(&self) -> &ModuleIdentity {
        &self.identity
    }

    pub fn assembly_name(&self) -> &str {
        &self.assembly_name
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    pub fn context_id(&self) -> Uuid {
        self.context.id()
    }

    pub fn assembly(&self) -> Option<&Arc<Assembly>> {
        self.assembly.as_ref()
    }

    /// Whether the image is still waiting to be materialized.
    pub fn has_pending_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn native_handles(&self) -> &[Arc<dyn NativeHandle>] {
        &self.native_handles
    }

    pub(crate) fn transition(&mut self, to: LoadState) {
        debug_assert!(to >= self.state, "state moved backwards: {:?} -> {:?}", self.state, to);
        tracing::debug!(guid = self.identity.guid(), from = ?self.state, ?to, "load state");
        self.state = to;
    }

    pub(crate) fn append_handles(&mut self, handles: Vec<Arc<dyn NativeHandle>>) {
        if matches!(self.state, LoadState::Loading | LoadState::Loaded) {
            self.native_handles.extend(handles);
        }
    }

    /// Answer the host loader for `location_token`. Materializes the image on
    /// the first call while `Loading`; later calls return the same assembly.
    fn materialize(&mut self, location_token: &str) -> Option<Arc<Assembly>> {
        if self.identity.location_token() != location_token {
            return None;
        }

        if self.state == LoadState::Loaded {
            return self.assembly.clone();
        }

        if self.state != LoadState::Loading {
            return None;
        }

        let image = self.image.take()?;
        let symbols = self.symbols.take();
        let digest = image.sha256_hex();
        let size = image.len();

        match self.context.load_from_image(&self.assembly_name, image, symbols) {
            Ok(assembly) => {
                self.assembly = Some(assembly.clone());
                self.transition(LoadState::Loaded);
                tracing::info!(
                    guid = self.identity.guid(),
                    assembly = %self.assembly_name,
                    size,
                    sha256 = %digest,
                    "assembly loaded from in-memory image"
                );
                Some(assembly)
            }
            Err(e) => {
                tracing::warn!(guid = self.identity.guid(), error = %e, "could not materialize image");
                None
            }
        }
    }

    pub(crate) fn dispose(mut self) -> Residue {
        self.transition(LoadState::Disposed);
        self.image = None;
        self.symbols = None;
        Residue {
            identity: self.identity,
            assembly_name: self.assembly_name,
            context: Arc::downgrade(&self.context),
            native_handles: self.native_handles,
        }
    }
}

/// Table of active load contexts, keyed by location token.
pub struct LoadContextManager {
    contexts: HashMap<String, LoadContext>,
    events: UnloadEvents,
}

impl LoadContextManager {
    pub fn new(events: UnloadEvents) -> Self {
        Self { contexts: HashMap::new(), events }
    }

    pub(crate) fn insert(
        &mut self,
        identity: ModuleIdentity,
        assembly_name: String,
        image: ModuleImage,
        symbols: Option<DebugSymbols>,
    ) -> &LoadContext {
        let location = identity.location_token().to_string();
        let ctx = LoadContext::new(identity, assembly_name, image, symbols, self.events.clone());
        self.contexts.entry(location).or_insert(ctx)
    }

    pub fn contains_guid(&self, guid: &str) -> bool {
        self.contexts.values().any(|c| c.identity.guid() == guid)
    }

    pub fn contains_location(&self, location_token: &str) -> bool {
        self.contexts.contains_key(location_token)
    }

    pub fn contains_assembly(&self, assembly_name: &str) -> bool {
        self.contexts.values().any(|c| c.assembly_name == assembly_name)
    }

    pub fn get(&self, guid: &str) -> Option<&LoadContext> {
        self.contexts.values().find(|c| c.identity.guid() == guid)
    }

    pub(crate) fn get_mut(&mut self, guid: &str) -> Option<&mut LoadContext> {
        self.contexts.values_mut().find(|c| c.identity.guid() == guid)
    }

    pub(crate) fn remove_by_context_id(&mut self, context_id: Uuid) -> Option<LoadContext> {
        let location = self
            .contexts
            .iter()
            .find(|(_, c)| c.context_id() == context_id)
            .map(|(location, _)| location.clone())?;
        self.contexts.remove(&location)
    }

    /// Ask every active context to begin unloading.
    pub(crate) fn request_unload_all(&self) -> usize {
        self.contexts
            .values()
            .filter(|c| c.context.begin_unload())
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadContext> {
        self.contexts.values()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

impl LoadInterceptor for LoadContextManager {
    fn try_resolve(&mut self, location_token: &str) -> Option<Arc<Assembly>> {
        self.contexts.get_mut(location_token)?.materialize(location_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::identity::ModuleVersion;
    use crate::lifecycle::image::TypeInfo;

    fn identity(guid: &str) -> ModuleIdentity {
        ModuleIdentity::new(guid, guid, ModuleVersion::new(1, 0, 0), format!("modswap://{guid}"))
    }

    fn image() -> ModuleImage {
        ModuleImage::new(vec![0xAB; 16], vec![TypeInfo::new("M", "Plugin")])
    }

    #[test]
    fn test_resolve_requires_loading_state() {
        let mut manager = LoadContextManager::new(UnloadEvents::new());
        manager.insert(identity("g1"), "M1".into(), image(), None);

        assert!(manager.try_resolve("modswap://g1").is_none(), "Ready must not resolve");
        assert!(manager.get("g1").unwrap().has_pending_image());

        manager.get_mut("g1").unwrap().transition(LoadState::Loading);
        let assembly = manager.try_resolve("modswap://g1").expect("Loading resolves");
        assert_eq!(assembly.name(), "M1");

        let ctx = manager.get("g1").unwrap();
        assert_eq!(ctx.state(), LoadState::Loaded);
        assert!(!ctx.has_pending_image(), "image released after materialization");
    }

    #[test]
    fn test_resolve_is_reentrant_after_load() {
        let mut manager = LoadContextManager::new(UnloadEvents::new());
        manager.insert(identity("g1"), "M1".into(), image(), None);
        manager.get_mut("g1").unwrap().transition(LoadState::Loading);

        let first = manager.try_resolve("modswap://g1").unwrap();
        let second = manager.try_resolve("modswap://g1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_unknown_location_falls_through() {
        let mut manager = LoadContextManager::new(UnloadEvents::new());
        manager.insert(identity("g1"), "M1".into(), image(), None);
        assert!(manager.try_resolve("/plugins/real.dll").is_none());
    }

    #[test]
    fn test_lookup_by_guid_and_assembly() {
        let mut manager = LoadContextManager::new(UnloadEvents::new());
        manager.insert(identity("g1"), "M1".into(), image(), None);
        assert!(manager.contains_guid("g1"));
        assert!(manager.contains_assembly("M1"));
        assert!(manager.contains_location("modswap://g1"));
        assert!(!manager.contains_guid("g2"));
    }

    #[test]
    fn test_dispose_leaves_weak_residue() {
        let events = UnloadEvents::new();
        let mut manager = LoadContextManager::new(events.clone());
        let id = manager.insert(identity("g1"), "M1".into(), image(), None).context_id();

        let ctx = manager.remove_by_context_id(id).unwrap();
        assert!(manager.is_empty());
        let residue = ctx.dispose();
        assert_eq!(residue.identity.guid(), "g1");
        assert!(residue.context.upgrade().is_none(), "no strong holder remains");
    }
}
