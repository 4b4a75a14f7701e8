//! Ports the embedding host implements.

use std::sync::Arc;
use thiserror::Error;

use super::context::Assembly;
use super::identity::ModuleIdentity;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Activation failed for {guid}: {reason}")]
    ActivationFailed { guid: String, reason: String },

    #[error("Module image not found: {0}")]
    ImageNotFound(String),
}

/// Capability of an object attached to a module's active-instance slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    /// Implements the host's plugin base capability.
    Plugin,
    /// Anything else; does not count as a successful load.
    Foreign,
}

/// The live object a host attaches for an activated module.
pub trait ModuleInstance: Send {
    fn kind(&self) -> InstanceKind;

    /// Ask the module to release what it holds. Returning false means the
    /// module declares itself not unloadable.
    fn unload(&mut self) -> bool;
}

/// Interception port the host loader consults before its own lookup.
pub trait LoadInterceptor {
    /// Resolve a location token. `None` means "not ours, fall through".
    fn try_resolve(&mut self, location_token: &str) -> Option<Arc<Assembly>>;
}

/// The host's module bootstrap.
pub trait ModuleHost: Send {
    /// Activate the pending modules. The host obtains images only through
    /// `loader`, and after returning (or panicking) each module's slot is
    /// either populated or empty.
    fn activate(
        &mut self,
        pending: &[ModuleIdentity],
        loader: &mut dyn LoadInterceptor,
    ) -> Result<(), HostError>;

    /// The instance attached to `guid`, if any.
    fn active_instance(&self, guid: &str) -> Option<&dyn ModuleInstance>;

    /// Remove the instance and any host bookkeeping for `guid`.
    fn detach(&mut self, guid: &str) -> Option<Box<dyn ModuleInstance>>;

    /// Whether the host loaded `guid` itself at startup.
    fn is_statically_loaded(&self, _guid: &str) -> bool {
        false
    }
}
