//! Table of generic methods inflated for injected types.

use parking_lot::Mutex;
use std::collections::HashMap;

use super::{AssemblySet, SweepError, SweepReport, Sweeper};
use crate::lifecycle::TypeRef;

/// An inflated method and the type that declares it.
#[derive(Debug, Clone)]
pub struct InflatedMethod {
    pub declaring_type: TypeRef,
    pub name: String,
}

impl InflatedMethod {
    pub fn new(declaring_type: TypeRef, name: impl Into<String>) -> Self {
        Self { declaring_type, name: name.into() }
    }

    fn describe(&self) -> String {
        format!("{}::{}", self.declaring_type.full_name(), self.name)
    }
}

/// Inflated methods keyed by native method pointer.
#[derive(Debug, Default)]
pub struct InflatedMethodTable {
    methods: Mutex<HashMap<usize, InflatedMethod>>,
}

impl InflatedMethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, method_ptr: usize, method: InflatedMethod) {
        self.methods.lock().insert(method_ptr, method);
    }

    pub fn contains(&self, method_ptr: usize) -> bool {
        self.methods.lock().contains_key(&method_ptr)
    }

    pub fn len(&self) -> usize {
        self.methods.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.lock().is_empty()
    }
}

impl Sweeper for InflatedMethodTable {
    fn name(&self) -> &str {
        "inflated-methods"
    }

    fn sweep(&self, owned: &AssemblySet) -> Result<SweepReport, SweepError> {
        let mut removed = Vec::new();
        self.methods.lock().retain(|_, method| {
            if owned.contains_type(&method.declaring_type) {
                removed.push(method.describe());
                false
            } else {
                true
            }
        });
        removed.sort();
        Ok(SweepReport { removed, unattributed: 0 })
    }
}
