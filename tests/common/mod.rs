//! Shared fakes for integration tests: a host that activates modules through
//! the interception port, and a compiler driven by marker lines in sources.

#![allow(dead_code)]

use modswap::lifecycle::{
    HandleKind, HandleTracker, HostError, InstanceKind, LoadInterceptor, ModuleDescriptor, ModuleHost,
    ModuleIdentity, ModuleImage, ModuleInstance, ModuleVersion, TypeInfo, TypeRef,
};
use modswap::pipeline::{
    CompileOutput, CompileRequest, CompiledModule, Diagnostic, ModuleCompiler, Severity,
};
use modswap::sweep::{ClassKey, InflatedMethod, MemberTable};
use modswap::StandardCaches;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What the fake host does when asked to activate a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Resolve the image and attach a plugin instance.
    Plugin,
    /// Resolve the image and attach an instance without the plugin capability.
    Foreign,
    /// Resolve the image and attach nothing.
    NoInstance,
    /// Never ask the loader for the image.
    NeverResolve,
    /// Return a host error before resolving.
    Fail,
    /// Panic before resolving.
    Panic,
    /// Resolve the image, then panic.
    PanicAfterResolve,
    /// Attach a plugin instance that refuses to unload.
    RefuseUnload,
    /// Attach a plugin instance whose unload hook panics.
    PanicOnUnload,
}

/// Counters and leaks a test can inspect after handing the host away.
#[derive(Default)]
pub struct HostProbe {
    pub activations: AtomicUsize,
    pub unload_calls: AtomicUsize,
    pub instances_dropped: Arc<AtomicUsize>,
    /// Strong type references deliberately kept outside every cache.
    pub leaked: Mutex<Vec<TypeRef>>,
}

impl HostProbe {
    pub fn release_leaks(&self) {
        self.leaked.lock().clear();
    }
}

struct FakeInstance {
    kind: InstanceKind,
    behavior: Behavior,
    _types: Vec<TypeRef>,
    probe: Arc<HostProbe>,
}

impl ModuleInstance for FakeInstance {
    fn kind(&self) -> InstanceKind {
        self.kind
    }

    fn unload(&mut self) -> bool {
        self.probe.unload_calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::RefuseUnload => false,
            Behavior::PanicOnUnload => panic!("instance unload exploded"),
            _ => true,
        }
    }
}

impl Drop for FakeInstance {
    fn drop(&mut self) {
        self.probe.instances_dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Host that resolves images only through the loader it is handed.
pub struct FakeHost {
    behaviors: HashMap<String, Behavior>,
    instances: HashMap<String, Box<dyn ModuleInstance>>,
    statically_loaded: HashSet<String>,
    caches: Option<StandardCaches>,
    tracker: Option<Arc<HandleTracker>>,
    leak_types: HashSet<String>,
    next_ptr: usize,
    probe: Arc<HostProbe>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
            instances: HashMap::new(),
            statically_loaded: HashSet::new(),
            caches: None,
            tracker: None,
            leak_types: HashSet::new(),
            next_ptr: 0x1000,
            probe: Arc::new(HostProbe::default()),
        }
    }

    pub fn probe(&self) -> Arc<HostProbe> {
        self.probe.clone()
    }

    pub fn with_behavior(mut self, guid: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(guid.to_string(), behavior);
        self
    }

    /// Populate every cache with the module's types on activation.
    pub fn with_caches(mut self, caches: StandardCaches) -> Self {
        self.caches = Some(caches);
        self
    }

    /// Pin each activated assembly through one handle allocated via `tracker`.
    pub fn with_handles(mut self, tracker: Arc<HandleTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Keep a strong type reference for `guid` in the probe.
    pub fn leaking(mut self, guid: &str) -> Self {
        self.leak_types.insert(guid.to_string());
        self
    }

    pub fn statically_loaded(mut self, guid: &str) -> Self {
        self.statically_loaded.insert(guid.to_string());
        self
    }

    /// Attach an instance without going through activation.
    pub fn preattach(&mut self, guid: &str) {
        let instance = FakeInstance {
            kind: InstanceKind::Plugin,
            behavior: Behavior::Plugin,
            _types: Vec::new(),
            probe: self.probe.clone(),
        };
        self.instances.insert(guid.to_string(), Box::new(instance));
    }

    fn ptr(&mut self) -> usize {
        self.next_ptr += 0x10;
        self.next_ptr
    }

    fn populate(&mut self, types: &[TypeRef]) {
        let Some(caches) = self.caches.clone() else { return };
        for ty in types {
            let info = ty.info().clone();
            let method_ptr = self.ptr();
            let class_ptr = self.ptr();
            caches.injected_types.insert(ty.full_name());
            caches.inflated_methods.insert(method_ptr, InflatedMethod::new(ty.clone(), "Run<i32>"));
            caches.class_lookup.insert(
                ClassKey::new(info.namespace.clone(), info.name.clone(), ty.assembly().id()),
                class_ptr,
            );
            for table in MemberTable::ALL {
                caches.reflection.insert(table, ty.clone(), "Run", method_ptr);
            }
            caches.type_index.insert(ty.clone());
        }
    }
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleHost for FakeHost {
    fn activate(
        &mut self,
        pending: &[ModuleIdentity],
        loader: &mut dyn LoadInterceptor,
    ) -> Result<(), HostError> {
        for identity in pending {
            self.probe.activations.fetch_add(1, Ordering::SeqCst);
            let guid = identity.guid().to_string();
            let behavior = self.behaviors.get(&guid).copied().unwrap_or(Behavior::Plugin);

            match behavior {
                Behavior::Fail => {
                    return Err(HostError::ActivationFailed { guid, reason: "bootstrap failed".into() })
                }
                Behavior::Panic => panic!("activation exploded"),
                Behavior::NeverResolve => continue,
                _ => {}
            }

            let assembly = loader
                .try_resolve(identity.location_token())
                .ok_or_else(|| HostError::ImageNotFound(identity.location_token().to_string()))?;
            let types = assembly.types();
            self.populate(&types);

            if let Some(tracker) = &self.tracker {
                tracker.allocate(format!("{guid}/root"), assembly.clone(), HandleKind::Normal);
            }
            if self.leak_types.contains(&guid) {
                self.probe.leaked.lock().extend(types.iter().cloned());
            }

            let kind = match behavior {
                Behavior::PanicAfterResolve => panic!("activation exploded after resolve"),
                Behavior::NoInstance => continue,
                Behavior::Foreign => InstanceKind::Foreign,
                _ => InstanceKind::Plugin,
            };
            let instance = FakeInstance { kind, behavior, _types: types, probe: self.probe.clone() };
            self.instances.insert(guid, Box::new(instance));
        }
        Ok(())
    }

    fn active_instance(&self, guid: &str) -> Option<&dyn ModuleInstance> {
        self.instances.get(guid).map(|i| i.as_ref())
    }

    fn detach(&mut self, guid: &str) -> Option<Box<dyn ModuleInstance>> {
        self.instances.remove(guid)
    }

    fn is_statically_loaded(&self, guid: &str) -> bool {
        self.statically_loaded.contains(guid)
    }
}

pub fn identity(guid: &str) -> ModuleIdentity {
    ModuleIdentity::from_descriptor(descriptor(guid))
}

pub fn descriptor(guid: &str) -> ModuleDescriptor {
    ModuleDescriptor {
        guid: guid.to_string(),
        name: guid.to_string(),
        version: ModuleVersion::new(1, 0, 0),
    }
}

pub fn image(namespace: &str) -> ModuleImage {
    ModuleImage::new(
        namespace.as_bytes().to_vec(),
        vec![TypeInfo::new(namespace, "Plugin"), TypeInfo::new(namespace, "Settings")],
    )
}

/// Compiler driven by marker lines in the sources:
///
/// - `error: <msg>` produces an error diagnostic and no module
/// - `guid: <guid>` declares a descriptor with that GUID
///
/// Sources without a `guid:` line compile to a module with no descriptor.
#[derive(Default)]
pub struct FakeCompiler {
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl ModuleCompiler for FakeCompiler {
    fn compile(&mut self, request: &CompileRequest) -> CompileOutput {
        self.requests.lock().push(request.assembly_name.clone());
        let lines = request.sources.iter().flat_map(|s| s.contents.lines().map(str::trim));

        let mut diagnostics = Vec::new();
        let mut guid = None;
        for line in lines {
            if let Some(msg) = line.strip_prefix("error:") {
                diagnostics.push(Diagnostic::new(Severity::Error, msg.trim()).at(&request.assembly_name));
            } else if let Some(g) = line.strip_prefix("guid:") {
                guid = Some(g.trim().to_string());
            }
        }
        diagnostics.push(Diagnostic::new(Severity::Info, "compiled"));

        if diagnostics.iter().any(|d| d.severity == Severity::Error) {
            return CompileOutput { diagnostics, module: None };
        }
        CompileOutput {
            diagnostics,
            module: Some(CompiledModule {
                image: image(&request.assembly_name),
                symbols: None,
                descriptor: guid.as_deref().map(descriptor),
            }),
        }
    }
}
