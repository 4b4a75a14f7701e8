//! Panic containment at module boundaries.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run `f`, turning a panic into its message.
///
/// Module code runs inside activation, instance unload and sweeps. Nothing it
/// raises may unwind into the lifecycle's own control flow.
pub(crate) fn contain<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contain_passes_values_through() {
        assert_eq!(contain(|| 7), Ok(7));
    }

    #[test]
    fn test_contain_reports_panic_message() {
        let result: Result<(), String> = contain(|| panic!("boom {}", 1));
        assert_eq!(result, Err("boom 1".to_string()));
    }
}
