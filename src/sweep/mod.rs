//! Cache sweep protocol.
//!
//! Every external cache that indexes data by type or assembly gets one
//! [`Sweeper`] adapter. When a context is disposed the registry hands each
//! sweeper the set of assemblies that context owns, and the sweeper removes
//! every entry belonging to them. Sweepers are independent: each cache is keyed
//! on its own, so the order they run in does not matter and running one twice
//! removes nothing the second time.

mod class_lookup;
mod inflated_methods;
mod injected_types;
mod reflection;
mod type_index;

pub use class_lookup::{ClassKey, ClassNameLookup};
pub use inflated_methods::{InflatedMethod, InflatedMethodTable};
pub use injected_types::InjectedTypeRegistry;
pub use reflection::{MemberTable, ReflectionCache};
pub use type_index::TypeIndex;

use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::lifecycle::{contain, Assembly, AssemblyId, ExecutionContext, TypeInfo, TypeRef};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SweepError {
    #[error("Sweeper {name} failed: {reason}")]
    Failed { name: String, reason: String },

    #[error("Sweeper {name} panicked: {message}")]
    Panicked { name: String, message: String },
}

/// Assemblies owned by an unloading context.
///
/// Holds ids and type names only, never the assemblies themselves, so building
/// one does not extend the context's lifetime.
#[derive(Debug, Clone, Default)]
pub struct AssemblySet {
    ids: HashSet<AssemblyId>,
    names: Vec<String>,
    types: Vec<TypeInfo>,
}

impl AssemblySet {
    pub fn from_context(context: &ExecutionContext) -> Self {
        Self::from_assemblies(&context.assemblies())
    }

    pub fn from_assemblies(assemblies: &[Arc<Assembly>]) -> Self {
        let mut set = Self::default();
        for assembly in assemblies {
            if set.ids.insert(assembly.id()) {
                set.names.push(assembly.name().to_string());
                set.types.extend(assembly.type_infos().iter().cloned());
            }
        }
        set
    }

    pub fn contains(&self, id: AssemblyId) -> bool {
        self.ids.contains(&id)
    }

    /// Match a raw image id as stored by native lookup tables.
    pub fn contains_image(&self, image: u64) -> bool {
        self.ids.iter().any(|id| id.value() == image)
    }

    pub fn contains_type(&self, ty: &TypeRef) -> bool {
        self.contains(ty.assembly().id())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Every type exported by the set's assemblies.
    pub fn types(&self) -> &[TypeInfo] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Outcome of one sweeper run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Keys removed, for debug logging. Values are never reported.
    pub removed: Vec<String>,
    /// Entries that looked related but could not be attributed to the set.
    pub unattributed: usize,
}

impl SweepReport {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}

/// Capability to purge a cache of entries owned by a set of assemblies.
pub trait Sweeper: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Remove every entry whose owning type or assembly is in `owned`.
    /// Must be idempotent.
    fn sweep(&self, owned: &AssemblySet) -> Result<SweepReport, SweepError>;
}

/// Result of running every registered sweeper once.
#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    pub removed: usize,
    pub unattributed: usize,
    pub failures: Vec<SweepError>,
}

/// Sweepers registered at startup.
#[derive(Clone, Default)]
pub struct SweepRegistry {
    sweepers: Vec<Arc<dyn Sweeper>>,
}

impl SweepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sweeper: Arc<dyn Sweeper>) {
        tracing::debug!(sweeper = sweeper.name(), "sweeper registered");
        self.sweepers.push(sweeper);
    }

    pub fn with(mut self, sweeper: Arc<dyn Sweeper>) -> Self {
        self.register(sweeper);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.sweepers.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.sweepers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sweepers.is_empty()
    }

    /// Run every sweeper against `owned`. A failing or panicking sweeper is
    /// logged and never stops the rest.
    pub fn sweep_all(&self, owned: &AssemblySet) -> SweepSummary {
        let mut summary = SweepSummary::default();
        if owned.is_empty() {
            return summary;
        }

        for sweeper in &self.sweepers {
            let name = sweeper.name();
            let outcome = contain(|| sweeper.sweep(owned)).unwrap_or_else(|message| {
                Err(SweepError::Panicked { name: name.to_string(), message })
            });

            match outcome {
                Ok(report) => {
                    if report.removed_count() > 0 {
                        tracing::info!(sweeper = name, removed = report.removed_count(), "cache swept");
                        tracing::debug!(sweeper = name, keys = ?report.removed, "removed keys");
                    }
                    if report.unattributed > 0 {
                        tracing::warn!(
                            sweeper = name,
                            unattributed = report.unattributed,
                            "some entries could not be attributed, left in place"
                        );
                    }
                    summary.removed += report.removed_count();
                    summary.unattributed += report.unattributed;
                }
                Err(e) => {
                    tracing::warn!(sweeper = name, error = %e, "sweep failed");
                    summary.failures.push(e);
                }
            }
        }
        summary
    }
}
