//! Compile-and-load pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::compiler::{CompileRequest, Diagnostic, ModuleCompiler, Severity, SourceFile};
use super::discovery::{discover, find_sources};
use super::link::{LinkResolver, SymlinkResolver};
use crate::lifecycle::{LifecycleError, LifecycleRegistry, ModuleIdentity};
use crate::telemetry::{LifecycleSpan, SpanExt};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Assembly {0} already exists")]
    AssemblyExists(String),

    #[error("Compilation of {assembly} failed with {} error(s)", error_count(.diagnostics))]
    CompileFailed {
        assembly: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("No module descriptor found in {0}")]
    NoDescriptor(String),

    #[error("Module {0} is already dynamically loaded")]
    AlreadyLoaded(String),

    #[error("Module {0} was loaded by the host at startup; remove it from the plugin directory and restart")]
    StaticallyLoaded(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn error_count(diagnostics: &[Diagnostic]) -> usize {
    diagnostics.iter().filter(|d| d.severity == Severity::Error).count()
}

/// What happened to one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No matching sources at the path.
    Skipped,
    Loaded { guid: String },
    /// Registered, but activation did not yield a plugin; already unloaded.
    ActivationFailed { guid: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub plugin_dir: PathBuf,
    /// Without the leading dot.
    pub source_extension: String,
    pub debug: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            plugin_dir: PathBuf::from("plugins"),
            source_extension: "rs".to_string(),
            debug: true,
        }
    }
}

/// Discovers inputs, compiles them and hands the results to the registry.
pub struct ModulePipeline {
    compiler: Box<dyn ModuleCompiler>,
    resolver: Box<dyn LinkResolver>,
    config: PipelineConfig,
}

impl ModulePipeline {
    pub fn new(compiler: Box<dyn ModuleCompiler>, config: PipelineConfig) -> Self {
        Self {
            compiler,
            resolver: Box::new(SymlinkResolver),
            config,
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn LinkResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Inputs in the plugin directory.
    pub fn discover(&self) -> std::io::Result<Vec<PathBuf>> {
        discover(&self.config.plugin_dir, &self.config.source_extension, self.resolver.as_ref())
    }

    /// Compile and load every discovered input. One failure never stops the rest.
    pub fn load_all(
        &mut self,
        registry: &mut LifecycleRegistry,
    ) -> Result<Vec<(PathBuf, Result<LoadOutcome, PipelineError>)>, PipelineError> {
        let inputs = self.discover()?;
        tracing::info!(
            plugin_dir = %self.config.plugin_dir.display(),
            inputs = ?inputs,
            "searching"
        );

        let mut results = Vec::with_capacity(inputs.len());
        for path in inputs {
            let result = self.compile_and_load(registry, &path);
            if let Err(e) = &result {
                tracing::warn!(path = %path.display(), error = %e, "input not loaded");
            }
            results.push((path, result));
        }
        Ok(results)
    }

    pub fn compile_and_load(
        &mut self,
        registry: &mut LifecycleRegistry,
        path: &Path,
    ) -> Result<LoadOutcome, PipelineError> {
        let span = LifecycleSpan::compile(&path.display().to_string());
        let _enter = span.enter();
        let result = self.compile_and_load_inner(registry, path, &span);
        span.record_result(&result);
        result
    }

    fn compile_and_load_inner(
        &mut self,
        registry: &mut LifecycleRegistry,
        path: &Path,
        span: &tracing::Span,
    ) -> Result<LoadOutcome, PipelineError> {
        let Some(sources) = find_sources(path, &self.config.source_extension)? else {
            tracing::debug!("no sources");
            return Ok(LoadOutcome::Skipped);
        };
        let assembly_name = sources.assembly_name;
        tracing::info!(assembly = %assembly_name, files = sources.files.len(), "found sources");

        if registry.contains_assembly(&assembly_name) {
            return Err(PipelineError::AssemblyExists(assembly_name));
        }

        let files = sources
            .files
            .into_iter()
            .map(|path| fs::read_to_string(&path).map(|contents| SourceFile { path, contents }))
            .collect::<Result<Vec<_>, _>>()?;

        let request = CompileRequest {
            assembly_name: assembly_name.clone(),
            sources: files,
            debug: self.config.debug,
        };
        let output = self.compiler.compile(&request);
        for diagnostic in &output.diagnostics {
            diagnostic.log(&assembly_name);
        }
        let Some(module) = output.module else {
            return Err(PipelineError::CompileFailed {
                assembly: assembly_name,
                diagnostics: output.diagnostics,
            });
        };

        let Some(descriptor) = module.descriptor else {
            return Err(PipelineError::NoDescriptor(assembly_name));
        };
        tracing::info!(
            guid = %descriptor.guid,
            name = %descriptor.name,
            version = %descriptor.version,
            "found module descriptor"
        );
        span.record("guid", descriptor.guid.as_str());

        if registry.is_tracked(&descriptor.guid) {
            return Err(PipelineError::AlreadyLoaded(descriptor.guid));
        }
        if registry.host().is_statically_loaded(&descriptor.guid) {
            tracing::error!(guid = %descriptor.guid, "module was loaded by the host at startup");
            return Err(PipelineError::StaticallyLoaded(descriptor.guid));
        }

        let identity = ModuleIdentity::from_descriptor(descriptor);
        let guid = identity.guid().to_string();
        registry.register(identity, assembly_name, module.image, module.symbols)?;

        if registry.trigger_load(&guid)? {
            Ok(LoadOutcome::Loaded { guid })
        } else {
            tracing::error!(%guid, "could not load module");
            Ok(LoadOutcome::ActivationFailed { guid })
        }
    }
}
