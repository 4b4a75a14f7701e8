//! Native class-name lookup table.
//!
//! Keys carry the namespace, the simple class name and the id of the image the
//! class was registered from. Only the name pair is derivable from managed
//! types, so the image id decides attribution: an entry whose name matches one
//! of our types but whose image belongs to someone else is reported as
//! unattributed and left alone.

use dashmap::DashMap;
use std::collections::HashSet;

use super::{AssemblySet, SweepError, SweepReport, Sweeper};
use crate::lifecycle::AssemblyId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassKey {
    pub namespace: String,
    pub class: String,
    pub image: u64,
}

impl ClassKey {
    pub fn new(namespace: impl Into<String>, class: impl Into<String>, image: AssemblyId) -> Self {
        Self {
            namespace: namespace.into(),
            class: class.into(),
            image: image.value(),
        }
    }

    fn display_name(&self) -> String {
        if self.namespace.is_empty() {
            self.class.clone()
        } else {
            format!("{}.{}", self.namespace, self.class)
        }
    }
}

/// `(namespace, class, image)` to native class pointer.
#[derive(Debug, Default)]
pub struct ClassNameLookup {
    entries: DashMap<ClassKey, usize>,
}

impl ClassNameLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: ClassKey, class_ptr: usize) {
        self.entries.insert(key, class_ptr);
    }

    pub fn get(&self, key: &ClassKey) -> Option<usize> {
        self.entries.get(key).map(|e| *e.value())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Sweeper for ClassNameLookup {
    fn name(&self) -> &str {
        "class-name-lookup"
    }

    fn sweep(&self, owned: &AssemblySet) -> Result<SweepReport, SweepError> {
        let ours: HashSet<(&str, &str)> = owned
            .types()
            .iter()
            .map(|t| (t.namespace.as_str(), t.name.as_str()))
            .collect();

        let mut unattributed = 0;
        let mut removed = Vec::new();
        self.entries.retain(|key, _| {
            if !ours.contains(&(key.namespace.as_str(), key.class.as_str())) {
                return true;
            }
            if owned.contains_image(key.image) {
                removed.push(key.display_name());
                false
            } else {
                unattributed += 1;
                true
            }
        });
        removed.sort();
        Ok(SweepReport { removed, unattributed })
    }
}
