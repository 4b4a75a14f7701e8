//! modswap
//!
//! Hot-swappable code modules for a long-running host. Each module is loaded
//! into its own collectible execution context, and unloading one removes every
//! runtime-internal cache entry that still points into it. Reclamation is then
//! verified tick by tick.
//!
//! # Lifecycle
//!
//! - **Register**: a compiled image enters the active table in `Ready`
//! - **Activate**: the host resolves the image through the interception port
//!   and attaches a plugin instance (`Loading` then `Loaded`)
//! - **Dispose**: the instance is detached, caches are swept, and the context
//!   moves to the unloading set as a weak reference
//! - **Verify**: every tick forces a full collection and polls each unloading
//!   record. Records still alive after the threshold are orphaned and reported
//!
//! The registry is single-threaded. Hosts that tick from a background task
//! wrap it in a mutex (see [`driver`]).

pub mod cli;
pub mod config;
pub mod driver;
pub mod lifecycle;
pub mod pipeline;
pub mod sweep;
pub mod telemetry;

use std::sync::Arc;

use crate::config::EnvConfig;
use crate::lifecycle::{LifecycleRegistry, ModuleHost};
use crate::sweep::{
    ClassNameLookup, InflatedMethodTable, InjectedTypeRegistry, ReflectionCache, SweepRegistry, TypeIndex,
};

pub use lifecycle::{LifecycleError, LoadState, TickReport};

/// The five runtime-internal caches every unload must sweep.
///
/// The host keeps clones of these `Arc`s to populate them; the registry sweeps
/// the same instances.
#[derive(Clone, Default)]
pub struct StandardCaches {
    pub injected_types: Arc<InjectedTypeRegistry>,
    pub inflated_methods: Arc<InflatedMethodTable>,
    pub class_lookup: Arc<ClassNameLookup>,
    pub reflection: Arc<ReflectionCache>,
    pub type_index: Arc<TypeIndex>,
}

impl StandardCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sweep registry over these caches, in a fixed order.
    pub fn sweep_registry(&self) -> SweepRegistry {
        SweepRegistry::new()
            .with(self.injected_types.clone())
            .with(self.inflated_methods.clone())
            .with(self.class_lookup.clone())
            .with(self.reflection.clone())
            .with(self.type_index.clone())
    }
}

/// Build a registry for `host` from loaded configuration.
pub fn registry_from_config(
    host: Box<dyn ModuleHost>,
    config: &EnvConfig,
    caches: &StandardCaches,
) -> LifecycleRegistry {
    LifecycleRegistry::new(host)
        .with_orphan_threshold(config.orphan_threshold)
        .with_sweepers(caches.sweep_registry())
}
