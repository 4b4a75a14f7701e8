//! Standard spans for lifecycle operations.

use tracing::{info_span, Span};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for lifecycle spans.
pub struct LifecycleSpan;

impl LifecycleSpan {
    /// `loaded` is filled in once activation has been evaluated.
    pub fn trigger_load(guid: &str) -> Span {
        info_span!(
            "trigger_load",
            guid = %guid,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            loaded = tracing::field::Empty,
        )
    }

    pub fn unload(guid: &str) -> Span {
        info_span!(
            "unload",
            guid = %guid,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }

    pub fn compile(path: &str) -> Span {
        info_span!(
            "compile_and_load",
            path = %path,
            guid = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }

    pub fn tick() -> Span {
        tracing::debug_span!("process_tick")
    }
}
