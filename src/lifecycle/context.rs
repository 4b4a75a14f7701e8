//! Isolated, collectible execution contexts.
//!
//! Reachability is expressed with reference counts. Every materialized
//! [`Assembly`] holds a strong reference to its context, while the context only
//! keeps weak references back to its assemblies. Anything that still holds an
//! assembly or a [`TypeRef`] therefore keeps the whole context alive, and a
//! context is reclaimed once the last such holder lets go.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use uuid::Uuid;

use super::error::LifecycleError;
use super::image::{DebugSymbols, ModuleImage, TypeInfo};

static NEXT_ASSEMBLY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique assembly identifier. Doubles as the image id native lookup
/// tables key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssemblyId(u64);

impl AssemblyId {
    fn next() -> Self {
        Self(NEXT_ASSEMBLY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Queue of "context is unloading" notifications.
///
/// Contexts push their id when they begin unloading; the lifecycle registry
/// drains the queue and performs the `Disposed` transition.
#[derive(Clone, Default)]
pub struct UnloadEvents {
    queue: Arc<Mutex<VecDeque<Uuid>>>,
}

impl UnloadEvents {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, context_id: Uuid) {
        self.queue.lock().push_back(context_id);
    }

    /// Take every pending notification in arrival order.
    pub fn drain(&self) -> Vec<Uuid> {
        self.queue.lock().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// A collectible unit of code isolation.
pub struct ExecutionContext {
    id: Uuid,
    name: String,
    assemblies: Mutex<Vec<Weak<Assembly>>>,
    unloading: AtomicBool,
    events: UnloadEvents,
}

impl ExecutionContext {
    pub fn new(name: impl Into<String>, events: UnloadEvents) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            assemblies: Mutex::new(Vec::new()),
            unloading: AtomicBool::new(false),
            events,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Materialize an image into this context.
    pub fn load_from_image(
        self: &Arc<Self>,
        assembly_name: &str,
        image: ModuleImage,
        symbols: Option<DebugSymbols>,
    ) -> Result<Arc<Assembly>, LifecycleError> {
        if self.is_unloading() {
            return Err(LifecycleError::ContextUnloading(self.name.clone()));
        }

        let digest = image.sha256_hex();
        let (code, types) = image.into_parts();
        let assembly = Arc::new(Assembly {
            id: AssemblyId::next(),
            name: assembly_name.to_string(),
            types,
            code: code.into_boxed_slice(),
            symbols: symbols.map(|s| s.0.into_boxed_slice()),
            digest,
            context: Arc::clone(self),
        });

        let mut assemblies = self.assemblies.lock();
        assemblies.retain(|a| a.strong_count() > 0);
        assemblies.push(Arc::downgrade(&assembly));
        Ok(assembly)
    }

    /// Assemblies that are still resident.
    pub fn assemblies(&self) -> Vec<Arc<Assembly>> {
        self.assemblies.lock().iter().filter_map(Weak::upgrade).collect()
    }

    /// Names of resident assemblies, sorted case-insensitively.
    pub fn assembly_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.assemblies().iter().map(|a| a.name.clone()).collect();
        names.sort_by_key(|n| n.to_lowercase());
        names
    }

    /// Ask the context to start unloading. Returns false if it already was.
    pub fn begin_unload(&self) -> bool {
        if self.unloading.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::debug!(context = %self.name, context_id = %self.id, "context unloading");
        self.events.push(self.id);
        true
    }

    pub fn is_unloading(&self) -> bool {
        self.unloading.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("unloading", &self.is_unloading())
            .finish()
    }
}

/// Code materialized from one module image.
pub struct Assembly {
    id: AssemblyId,
    name: String,
    types: Vec<TypeInfo>,
    code: Box<[u8]>,
    symbols: Option<Box<[u8]>>,
    digest: String,
    context: Arc<ExecutionContext>,
}

impl Assembly {
    pub fn id(&self) -> AssemblyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    pub fn has_symbols(&self) -> bool {
        self.symbols.is_some()
    }

    /// SHA-256 of the image this assembly was materialized from.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    pub fn type_infos(&self) -> &[TypeInfo] {
        &self.types
    }

    /// All exported types as strong references.
    pub fn types(self: &Arc<Self>) -> Vec<TypeRef> {
        (0..self.types.len())
            .map(|index| TypeRef { assembly: Arc::clone(self), index })
            .collect()
    }

    /// Look up an exported type by full name.
    pub fn type_ref(self: &Arc<Self>, full_name: &str) -> Option<TypeRef> {
        self.types
            .iter()
            .position(|t| t.full_name() == full_name)
            .map(|index| TypeRef { assembly: Arc::clone(self), index })
    }
}

impl fmt::Debug for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assembly")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("types", &self.types.len())
            .finish()
    }
}

/// Strong reference to a type exported by an assembly.
#[derive(Clone)]
pub struct TypeRef {
    assembly: Arc<Assembly>,
    index: usize,
}

impl TypeRef {
    pub fn info(&self) -> &TypeInfo {
        &self.assembly.types[self.index]
    }

    pub fn assembly(&self) -> &Arc<Assembly> {
        &self.assembly
    }

    pub fn full_name(&self) -> String {
        self.info().full_name()
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.assembly.id == other.assembly.id && self.index == other.index
    }
}

impl Eq for TypeRef {}

impl Hash for TypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.assembly.id.hash(state);
        self.index.hash(state);
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.full_name(), self.assembly.name)
    }
}
