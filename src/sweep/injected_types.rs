//! Registry of type names injected into the native runtime.

use parking_lot::Mutex;
use std::collections::HashSet;

use super::{AssemblySet, SweepError, SweepReport, Sweeper};

/// Full names of types that have been injected. A name left behind makes a
/// later injection of the same type name fail.
#[derive(Debug, Default)]
pub struct InjectedTypeRegistry {
    names: Mutex<HashSet<String>>,
}

impl InjectedTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an injection. Returns false if the name was already injected.
    pub fn insert(&self, full_name: impl Into<String>) -> bool {
        self.names.lock().insert(full_name.into())
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.names.lock().contains(full_name)
    }

    pub fn len(&self) -> usize {
        self.names.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.lock().is_empty()
    }
}

impl Sweeper for InjectedTypeRegistry {
    fn name(&self) -> &str {
        "injected-types"
    }

    fn sweep(&self, owned: &AssemblySet) -> Result<SweepReport, SweepError> {
        let mut names = self.names.lock();
        let mut removed: Vec<String> = owned
            .types()
            .iter()
            .map(|t| t.full_name())
            .filter(|full_name| names.remove(full_name))
            .collect();
        removed.sort();
        removed.dedup();
        Ok(SweepReport { removed, unattributed: 0 })
    }
}
