//! Compiler port.
//!
//! Compilation is a batch service outside this crate. It takes source
//! contents, a module name and a debug flag, and produces either a complete
//! module or diagnostics explaining why not. It never emits half a module.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::lifecycle::{DebugSymbols, ModuleDescriptor, ModuleImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Hidden,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// `file:line:col` when the compiler knows it.
    pub location: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self { severity, message: message.into(), location: None }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Emit at the matching `tracing` level.
    pub fn log(&self, assembly: &str) {
        let location = self.location.as_deref().unwrap_or("");
        match self.severity {
            Severity::Hidden => tracing::trace!(assembly, location, "{}", self.message),
            Severity::Info => tracing::info!(assembly, location, "{}", self.message),
            Severity::Warning => tracing::warn!(assembly, location, "{}", self.message),
            Severity::Error => tracing::error!(assembly, location, "{}", self.message),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{location}: {:?}: {}", self.severity, self.message),
            None => write!(f, "{:?}: {}", self.severity, self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub contents: String,
}

#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub assembly_name: String,
    pub sources: Vec<SourceFile>,
    /// Debug builds carry symbols and skip optimization.
    pub debug: bool,
}

/// A successfully compiled module.
#[derive(Debug, Clone)]
pub struct CompiledModule {
    pub image: ModuleImage,
    pub symbols: Option<DebugSymbols>,
    /// What the module declares about itself, if it declares anything.
    pub descriptor: Option<ModuleDescriptor>,
}

#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    pub diagnostics: Vec<Diagnostic>,
    /// `None` when compilation failed.
    pub module: Option<CompiledModule>,
}

impl CompileOutput {
    pub fn succeeded(&self) -> bool {
        self.module.is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
    }
}

pub trait ModuleCompiler: Send {
    fn compile(&mut self, request: &CompileRequest) -> CompileOutput;
}
