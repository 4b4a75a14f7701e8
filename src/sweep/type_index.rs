//! Name-to-type index kept by inspection tooling.

use dashmap::DashMap;

use super::{AssemblySet, SweepError, SweepReport, Sweeper};
use crate::lifecycle::TypeRef;

/// Every known type by full name.
#[derive(Debug, Default)]
pub struct TypeIndex {
    types: DashMap<String, TypeRef>,
}

impl TypeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ty: TypeRef) {
        self.types.insert(ty.full_name(), ty);
    }

    pub fn get(&self, full_name: &str) -> Option<TypeRef> {
        self.types.get(full_name).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Sweeper for TypeIndex {
    fn name(&self) -> &str {
        "type-index"
    }

    fn sweep(&self, owned: &AssemblySet) -> Result<SweepReport, SweepError> {
        let mut removed = Vec::new();
        self.types.retain(|name, ty| {
            if owned.contains_type(ty) {
                removed.push(name.clone());
                false
            } else {
                true
            }
        });
        removed.sort();
        Ok(SweepReport { removed, unattributed: 0 })
    }
}
