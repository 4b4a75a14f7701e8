//! Reflection member cache.
//!
//! Six tables, each keyed by the type whose members were looked up. The keys
//! are strong type references, so a single forgotten entry keeps the whole
//! context alive.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};

use super::{AssemblySet, SweepError, SweepReport, Sweeper};
use crate::lifecycle::TypeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberTable {
    DeclaredFields,
    DeclaredProperties,
    DeclaredMethods,
    InheritedFields,
    InheritedProperties,
    InheritedMethods,
}

impl MemberTable {
    pub const ALL: [MemberTable; 6] = [
        MemberTable::DeclaredFields,
        MemberTable::DeclaredProperties,
        MemberTable::DeclaredMethods,
        MemberTable::InheritedFields,
        MemberTable::InheritedProperties,
        MemberTable::InheritedMethods,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Member name to an opaque member handle.
type Members = HashMap<String, usize>;

#[derive(Debug, Default)]
pub struct ReflectionCache {
    tables: [Mutex<HashMap<TypeRef, Members>>; 6],
}

impl ReflectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, table: MemberTable, ty: TypeRef, member: impl Into<String>, handle: usize) {
        self.tables[table.index()]
            .lock()
            .entry(ty)
            .or_default()
            .insert(member.into(), handle);
    }

    pub fn contains_type(&self, table: MemberTable, ty: &TypeRef) -> bool {
        self.tables[table.index()].lock().contains_key(ty)
    }

    /// Distinct types cached across all tables.
    pub fn type_count(&self) -> usize {
        let mut seen = HashSet::new();
        for table in &self.tables {
            seen.extend(table.lock().keys().cloned());
        }
        seen.len()
    }
}

impl Sweeper for ReflectionCache {
    fn name(&self) -> &str {
        "reflection-members"
    }

    fn sweep(&self, owned: &AssemblySet) -> Result<SweepReport, SweepError> {
        // A type cached in several tables is reported once.
        let mut removed = BTreeSet::new();
        for table in &self.tables {
            table.lock().retain(|ty, _| {
                if owned.contains_type(ty) {
                    removed.insert(ty.full_name());
                    false
                } else {
                    true
                }
            });
        }
        Ok(SweepReport {
            removed: removed.into_iter().collect(),
            unattributed: 0,
        })
    }
}
