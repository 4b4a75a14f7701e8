//! Lifecycle error types.
//!
//! Errors here are programming or registration errors. Failures that originate
//! inside module code never surface as `LifecycleError`; they are logged and
//! reported as a `false` load outcome instead.

use thiserror::Error;

use super::load::LoadState;

/// Errors raised by the load/unload lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Module {guid} (assembly {assembly_name}) is already active or unloading")]
    DuplicateIdentity { guid: String, assembly_name: String },

    #[error("Cannot {operation} module {guid} in state {actual:?}, expected {expected:?}")]
    InvalidStateTransition {
        guid: String,
        operation: &'static str,
        actual: LoadState,
        expected: LoadState,
    },

    #[error("Module {guid} already has an active instance attached")]
    AlreadyInstantiated { guid: String },

    #[error("Module not registered: {0}")]
    UnknownModule(String),

    #[error("Execution context {0} is unloading")]
    ContextUnloading(String),
}

impl LifecycleError {
    /// Returns true if the error indicates caller misuse rather than a
    /// registration conflict.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidStateTransition { .. } | Self::AlreadyInstantiated { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_message_names_both_keys() {
        let err = LifecycleError::DuplicateIdentity {
            guid: "com.example.m1".into(),
            assembly_name: "M1".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("com.example.m1"));
        assert!(msg.contains("M1"));
        assert!(!err.is_programming_error());
    }

    #[test]
    fn test_state_transition_is_programming_error() {
        let err = LifecycleError::InvalidStateTransition {
            guid: "g".into(),
            operation: "load",
            actual: LoadState::Loaded,
            expected: LoadState::Ready,
        };
        assert!(err.is_programming_error());
        assert!(err.to_string().contains("Loaded"));
    }
}
