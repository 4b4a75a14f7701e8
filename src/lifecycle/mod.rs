//! Load/unload lifecycle of hot-swappable modules.
//!
//! A module is registered with its compiled image, activated through the host,
//! and eventually disposed when its execution context signals that it is
//! unloading. Disposal sweeps every registered cache and hands what is left to
//! an unload record, which is polled each tick until the context is reclaimed
//! or declared orphaned.

mod boundary;
mod clock;
mod collector;
mod context;
mod error;
mod handles;
mod host;
mod identity;
mod image;
mod load;
mod registry;
mod unload;

pub(crate) use boundary::contain;
pub use clock::{Clock, ManualClock, SystemClock};
pub use collector::{Collector, Collectors, CycleTimings, FinalizerQueue};
pub use context::{Assembly, AssemblyId, ExecutionContext, TypeRef, UnloadEvents};
pub use error::LifecycleError;
pub use handles::{AllocationScope, GcHandle, HandleKind, HandleTracker, NativeHandle, Subscription};
pub use host::{HostError, InstanceKind, LoadInterceptor, ModuleHost, ModuleInstance};
pub use identity::{
    location_token_for, ModuleDescriptor, ModuleIdentity, ModuleVersion, VersionError, LOCATION_SCHEME,
};
pub use image::{DebugSymbols, ModuleImage, TypeInfo};
pub use load::{LoadContext, LoadContextManager, LoadState};
pub use registry::LifecycleRegistry;
pub use unload::{
    format_seconds, PollOutcome, RecordSummary, TickReport, UnloadContextManager, UnloadKey, UnloadRecord,
    DEFAULT_ORPHAN_THRESHOLD,
};
