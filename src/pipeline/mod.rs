//! From source on disk to a registered, activated module.

mod compiler;
mod discovery;
mod link;
mod loader;

pub use compiler::{
    CompileOutput, CompileRequest, CompiledModule, Diagnostic, ModuleCompiler, Severity, SourceFile,
};
pub use discovery::{discover, find_sources, SourceSet};
pub use link::{LinkResolver, NoLinks, SymlinkResolver};
pub use loader::{LoadOutcome, ModulePipeline, PipelineConfig, PipelineError};
