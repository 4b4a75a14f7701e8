//! Lifecycle metrics through the `metrics` facade.
//!
//! No recorder is installed here; without one every call is a no-op.

use ::metrics::{counter, gauge, histogram};

use crate::lifecycle::TickReport;

pub fn record_module_registered() {
    counter!("modswap_modules_registered_total").increment(1);
}

pub fn record_load_outcome(loaded: bool) {
    let outcome = if loaded { "loaded" } else { "failed" };
    counter!("modswap_loads_total", "outcome" => outcome).increment(1);
}

pub fn record_sweep(removed: usize, failures: usize) {
    counter!("modswap_sweep_entries_removed_total").increment(removed as u64);
    if failures > 0 {
        counter!("modswap_sweep_failures_total").increment(failures as u64);
    }
}

pub fn record_tick(report: &TickReport) {
    counter!("modswap_contexts_reclaimed_total").increment(report.reclaimed.len() as u64);
    counter!("modswap_contexts_orphaned_total").increment(report.orphaned.len() as u64);
    counter!("modswap_handles_released_total").increment(report.handles_released as u64);
    if let Some(timings) = &report.timings {
        histogram!("modswap_collection_seconds", "collector" => "managed").record(timings.managed.as_secs_f64());
        if let Some(secondary) = timings.secondary {
            histogram!("modswap_collection_seconds", "collector" => "secondary").record(secondary.as_secs_f64());
        }
    }
}

pub fn record_lifecycle_sizes(active: usize, unloading: usize, orphaned: usize) {
    gauge!("modswap_active_contexts").set(active as f64);
    gauge!("modswap_unloading_contexts").set(unloading as f64);
    gauge!("modswap_orphaned_contexts").set(orphaned as f64);
}
