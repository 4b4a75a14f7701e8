//! Unload records and the tick-driven reclamation poller.
//!
//! Unloading is never synchronous. After a context is disposed the only
//! signal left is whether its weak reference still upgrades, so each record is
//! polled once per tick after a full collection cycle. Records that stay alive
//! for `orphan_threshold` polls move to the orphaned set, where they keep being
//! polled for as long as the process runs.

use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use super::clock::Clock;
use super::boundary::contain;
use super::collector::{Collectors, CycleTimings};
use super::context::ExecutionContext;
use super::handles::NativeHandle;
use super::identity::ModuleIdentity;
use super::load::Residue;

/// Polls an unloading record survives before it is considered orphaned.
pub const DEFAULT_ORPHAN_THRESHOLD: u32 = 10;

/// Key of the unloading set: GUID (case-insensitive), then unload start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnloadKey {
    guid: String,
    unload_start: DateTime<Utc>,
}

impl UnloadKey {
    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn unload_start(&self) -> DateTime<Utc> {
        self.unload_start
    }
}

impl Ord for UnloadKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.guid
            .to_lowercase()
            .cmp(&other.guid.to_lowercase())
            .then_with(|| self.guid.cmp(&other.guid))
            .then_with(|| self.unload_start.cmp(&other.unload_start))
    }
}

impl PartialOrd for UnloadKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Result of polling one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Reclaimed,
    Pending { released_handle: bool },
}

/// What is left of a module after disposal.
pub struct UnloadRecord {
    identity: ModuleIdentity,
    assembly_name: String,
    context: Weak<ExecutionContext>,
    native_handles: Vec<Arc<dyn NativeHandle>>,
    unload_start: DateTime<Utc>,
    unload_done: Option<DateTime<Utc>>,
    poll_count: u32,
}

impl UnloadRecord {
    pub(crate) fn new(residue: Residue, unload_start: DateTime<Utc>) -> Self {
        Self {
            identity: residue.identity,
            assembly_name: residue.assembly_name,
            context: residue.context,
            native_handles: residue.native_handles,
            unload_start,
            unload_done: None,
            poll_count: 0,
        }
    }

    pub fn key(&self) -> UnloadKey {
        UnloadKey {
            guid: self.identity.guid().to_string(),
            unload_start: self.unload_start,
        }
    }

    pub fn identity(&self) -> &ModuleIdentity {
        &self.identity
    }

    pub fn assembly_name(&self) -> &str {
        &self.assembly_name
    }

    pub fn unload_start(&self) -> DateTime<Utc> {
        self.unload_start
    }

    pub fn unload_done(&self) -> Option<DateTime<Utc>> {
        self.unload_done
    }

    pub fn poll_count(&self) -> u32 {
        self.poll_count
    }

    /// Handles not yet popped for release.
    pub fn pending_handles(&self) -> usize {
        self.native_handles.len()
    }

    pub fn is_reclaimed(&self) -> bool {
        self.context.strong_count() == 0
    }

    /// Check liveness once. A surviving context gets at most one handle freed.
    pub fn poll(&mut self, now: DateTime<Utc>) -> PollOutcome {
        self.poll_count = self.poll_count.saturating_add(1);

        if self.is_reclaimed() {
            self.unload_done = Some(now);
            return PollOutcome::Reclaimed;
        }

        PollOutcome::Pending {
            released_handle: self.release_last_handle(),
        }
    }

    // Reverse allocation order: later handles may depend on earlier ones
    // having been finalized first. Freeing drops module objects, so it runs
    // contained.
    fn release_last_handle(&mut self) -> bool {
        while let Some(handle) = self.native_handles.pop() {
            if !handle.is_allocated() {
                continue;
            }
            let description = handle.describe();
            tracing::info!(
                guid = self.identity.guid(),
                handle = %description,
                remaining = self.native_handles.len(),
                "force-releasing native handle"
            );
            if let Err(panic) = contain(move || {
                handle.free();
                drop(handle);
            }) {
                tracing::warn!(
                    guid = self.identity.guid(),
                    handle = %description,
                    %panic,
                    "native handle target panicked while being released"
                );
            }
            return true;
        }
        false
    }

    /// Snapshot for reporting.
    pub fn summary(&self, now: DateTime<Utc>) -> RecordSummary {
        let end = self.unload_done.unwrap_or(now);
        let resident = match self.context.upgrade() {
            Some(context) => context.assembly_names(),
            None => Vec::new(),
        };
        RecordSummary {
            guid: self.identity.guid().to_string(),
            name: self.identity.name().to_string(),
            collections: self.poll_count,
            elapsed: end - self.unload_start,
            reclaimed: self.unload_done.is_some(),
            resident,
        }
    }
}

impl fmt::Debug for UnloadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnloadRecord")
            .field("guid", &self.identity.guid())
            .field("assembly", &self.assembly_name)
            .field("poll_count", &self.poll_count)
            .field("reclaimed", &self.is_reclaimed())
            .finish()
    }
}

/// Log-friendly view of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSummary {
    pub guid: String,
    pub name: String,
    pub collections: u32,
    pub elapsed: Duration,
    pub reclaimed: bool,
    /// Assemblies still resident, sorted case-insensitively. Empty once reclaimed.
    pub resident: Vec<String>,
}

impl fmt::Display for RecordSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): survived {} collections in {}",
            self.name,
            self.guid,
            self.collections,
            format_seconds(self.elapsed)
        )?;
        if !self.reclaimed && !self.resident.is_empty() {
            write!(f, ", resident: [{}]", self.resident.join(", "))?;
        }
        Ok(())
    }
}

/// Seconds with up to three decimals and no trailing zeros.
pub fn format_seconds(elapsed: Duration) -> String {
    let secs = elapsed.num_milliseconds() as f64 / 1000.0;
    let text = format!("{secs:.3}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text}s")
}

/// Outcome of one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// `None` when the tick returned early without collecting.
    pub timings: Option<CycleTimings>,
    pub reclaimed: Vec<RecordSummary>,
    pub orphaned: Vec<RecordSummary>,
    pub handles_released: usize,
}

impl TickReport {
    pub fn collected(&self) -> bool {
        self.timings.is_some()
    }

    pub fn has_changes(&self) -> bool {
        !self.reclaimed.is_empty() || !self.orphaned.is_empty()
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |items: &[RecordSummary]| {
            items.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
        };
        write!(
            f,
            "reclaimed {} [{}], orphaned {} [{}]",
            self.reclaimed.len(),
            join(&self.reclaimed),
            self.orphaned.len(),
            join(&self.orphaned)
        )
    }
}

/// Owner of every record between disposal and reclamation.
pub struct UnloadContextManager {
    unloading: BTreeMap<UnloadKey, UnloadRecord>,
    orphaned: Vec<UnloadRecord>,
    orphan_threshold: u32,
}

impl UnloadContextManager {
    pub fn new(orphan_threshold: u32) -> Self {
        Self {
            unloading: BTreeMap::new(),
            orphaned: Vec::new(),
            orphan_threshold: orphan_threshold.max(1),
        }
    }

    pub fn orphan_threshold(&self) -> u32 {
        self.orphan_threshold
    }

    /// Applies to records already tracked; their poll counts are kept.
    pub(crate) fn set_orphan_threshold(&mut self, threshold: u32) {
        self.orphan_threshold = threshold.max(1);
    }

    pub(crate) fn insert(&mut self, record: UnloadRecord) {
        tracing::debug!(
            guid = record.identity.guid(),
            handles = record.pending_handles(),
            "tracking unload"
        );
        self.unloading.insert(record.key(), record);
    }

    pub fn is_unloading(&self, guid: &str) -> bool {
        self.unloading.keys().any(|k| k.guid == guid)
    }

    pub fn is_orphaned(&self, guid: &str) -> bool {
        self.orphaned.iter().any(|r| r.identity.guid() == guid)
    }

    /// Whether `guid` is in either set.
    pub fn contains_guid(&self, guid: &str) -> bool {
        self.is_unloading(guid) || self.is_orphaned(guid)
    }

    pub fn contains_assembly(&self, assembly_name: &str) -> bool {
        self.unloading
            .values()
            .chain(self.orphaned.iter())
            .any(|r| r.assembly_name == assembly_name)
    }

    /// Unloading records in key order.
    pub fn unloading(&self) -> impl Iterator<Item = &UnloadRecord> {
        self.unloading.values()
    }

    pub fn orphaned(&self) -> &[UnloadRecord] {
        &self.orphaned
    }

    pub fn unloading_len(&self) -> usize {
        self.unloading.len()
    }

    pub fn orphaned_len(&self) -> usize {
        self.orphaned.len()
    }

    pub fn is_idle(&self) -> bool {
        self.unloading.is_empty() && self.orphaned.is_empty()
    }

    /// Run one collection cycle and poll every record.
    pub fn process_tick(&mut self, collectors: &Collectors, clock: &dyn Clock) -> TickReport {
        if self.is_idle() {
            return TickReport::default();
        }

        let mut report = TickReport {
            timings: Some(collectors.full_cycle()),
            ..TickReport::default()
        };
        let now = clock.now();
        let prior_orphans = self.orphaned.len();

        // Records stay in their set while polled; a poll never loses one.
        let keys: Vec<UnloadKey> = self.unloading.keys().cloned().collect();
        for key in keys {
            let Some(record) = self.unloading.get_mut(&key) else { continue };
            match record.poll(now) {
                PollOutcome::Reclaimed => {
                    report.reclaimed.push(record.summary(now));
                    self.unloading.remove(&key);
                }
                PollOutcome::Pending { released_handle } => {
                    if released_handle {
                        report.handles_released += 1;
                    }
                    if record.poll_count < self.orphan_threshold {
                        continue;
                    }
                    let summary = record.summary(now);
                    tracing::warn!(
                        guid = %summary.guid,
                        poll_count = record.poll_count,
                        resident = ?summary.resident,
                        "context did not unload, moving to orphaned"
                    );
                    report.orphaned.push(summary);
                    if let Some(record) = self.unloading.remove(&key) {
                        self.orphaned.push(record);
                    }
                }
            }
        }

        // Orphans moved above were already polled this tick.
        for record in &mut self.orphaned[..prior_orphans] {
            match record.poll(now) {
                PollOutcome::Reclaimed => {
                    tracing::info!(guid = record.identity.guid(), "orphaned context reclaimed");
                    report.reclaimed.push(record.summary(now));
                }
                PollOutcome::Pending { released_handle } => {
                    if released_handle {
                        report.handles_released += 1;
                    }
                }
            }
        }
        self.orphaned.retain(|r| r.unload_done.is_none());

        if report.has_changes() {
            tracing::info!(
                unloading = self.unloading.len(),
                orphaned = self.orphaned.len(),
                "{}",
                report
            );
        }
        report
    }
}

impl Default for UnloadContextManager {
    fn default() -> Self {
        Self::new(DEFAULT_ORPHAN_THRESHOLD)
    }
}
