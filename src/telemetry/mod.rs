//! Telemetry for modswap.
//!
//! Structured logging, lifecycle spans and metrics. Nothing here opens a
//! network socket; exporting is the embedding host's business.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    record_lifecycle_sizes, record_load_outcome, record_module_registered, record_sweep, record_tick,
};
pub use spans::{LifecycleSpan, SpanExt};
