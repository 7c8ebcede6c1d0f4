//! Turns shader names into linked programs.
//!
//! Resolution order for a name:
//!
//! 1. A live program already built for the name.
//! 2. Fragment source: imported shader (direct text, or pass 0 of a preset),
//!    then the built-in table, then the default effect. A preset that cannot
//!    be resolved uses [`fallback_fragment_shader`].
//! 3. The content cache, keyed by the fragment text.
//! 4. The native compiler; its output is cached, and on failure the original
//!    text is used unchanged.
//! 5. GPU stage compile and link. Only this step can fail a request.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use shadercache::{CacheStats, ShaderCache, ShaderStage};
use shadersource::{
    ExternalKind, ExternalRegistry, ExternalShader, ExternalSourceResolver, LoadError,
    ShaderReference,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::backend::{GpuBackend, GpuError, ProgramHandle, StageHandle};
use crate::builtin::{self, fallback_fragment_shader, DEFAULT_VERTEX_SHADER};
use crate::native::NativeCompiler;

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("failed to compile {stage} shader for '{name}': {source}")]
    StageCompile {
        name: String,
        stage: ShaderStage,
        #[source]
        source: GpuError,
    },
    #[error("failed to link program for '{name}': {source}")]
    Link {
        name: String,
        #[source]
        source: GpuError,
    },
}

/// Where the fragment text of a resolution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOrigin {
    Builtin,
    External,
    Preset,
    /// Generated tint used when a preset could not be resolved.
    Fallback,
    /// Unknown name; the default effect was used.
    Default,
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceOrigin::Builtin => "builtin",
            SourceOrigin::External => "external",
            SourceOrigin::Preset => "preset",
            SourceOrigin::Fallback => "fallback",
            SourceOrigin::Default => "default",
        };
        f.write_str(label)
    }
}

/// What happened to the fragment text between resolution and the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentCompilation {
    CacheHit,
    Compiled,
    Uncompiled,
}

impl fmt::Display for FragmentCompilation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FragmentCompilation::CacheHit => "cache-hit",
            FragmentCompilation::Compiled => "compiled",
            FragmentCompilation::Uncompiled => "uncompiled",
        };
        f.write_str(label)
    }
}

/// Source pair ready for the GPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSources {
    pub name: String,
    pub vertex: &'static str,
    pub fragment: String,
    pub origin: SourceOrigin,
    pub compilation: FragmentCompilation,
}

/// Program installed for a name, with how its fragment text was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltProgram {
    pub program: ProgramHandle,
    pub origin: SourceOrigin,
    pub compilation: FragmentCompilation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompilerState {
    Ready,
    Unavailable,
    /// Shut down by `cleanup`; initialized again on the next build.
    Released,
}

pub struct ShaderManager {
    programs: HashMap<String, BuiltProgram>,
    cache: Arc<ShaderCache>,
    externals: Arc<ExternalRegistry>,
    resolver: ExternalSourceResolver,
    compiler: Box<dyn NativeCompiler>,
    compiler_state: CompilerState,
    gpu: Box<dyn GpuBackend>,
}

impl ShaderManager {
    pub fn new(
        cache: Arc<ShaderCache>,
        compiler: Box<dyn NativeCompiler>,
        gpu: Box<dyn GpuBackend>,
    ) -> Self {
        let mut manager = Self {
            programs: HashMap::new(),
            cache,
            externals: Arc::new(ExternalRegistry::new()),
            resolver: ExternalSourceResolver::new(),
            compiler,
            compiler_state: CompilerState::Released,
            gpu,
        };
        manager.initialize_compiler();
        manager
    }

    /// Shares `registry` instead of the private one created by [`new`](Self::new).
    pub fn with_registry(mut self, registry: Arc<ExternalRegistry>) -> Self {
        self.externals = registry;
        self
    }

    pub fn registry(&self) -> &Arc<ExternalRegistry> {
        &self.externals
    }

    pub fn gpu(&self) -> &dyn GpuBackend {
        self.gpu.as_ref()
    }

    /// Live program currently installed for `name`, if any.
    pub fn program(&self, name: &str) -> Option<ProgramHandle> {
        self.programs.get(name).map(|built| built.program)
    }

    /// Installed program for `name` along with where its source came from.
    pub fn program_info(&self, name: &str) -> Option<BuiltProgram> {
        self.programs.get(name).copied()
    }

    pub fn create_program(&mut self, name: &str) -> Result<ProgramHandle, ProgramError> {
        self.create_program_info(name).map(|built| built.program)
    }

    /// Same as [`create_program`](Self::create_program), returning the
    /// resolution details recorded when the program was built.
    pub fn create_program_info(&mut self, name: &str) -> Result<BuiltProgram, ProgramError> {
        if let Some(&built) = self.programs.get(name) {
            if self.gpu.is_program(built.program) {
                return Ok(built);
            }
            debug!(shader = %name, program = %built.program, "cached program is gone; rebuilding");
            self.programs.remove(name);
        }
        self.build_program(name)
    }

    /// Rebuilds `name` even if a live program exists. The old program stays
    /// installed if the rebuild fails.
    pub fn reload_program(&mut self, name: &str) -> Result<ProgramHandle, ProgramError> {
        info!(shader = %name, "reloading shader program");
        self.build_program(name).map(|built| built.program)
    }

    /// Steps 2 to 4 of program creation, without touching the GPU.
    pub fn resolve_sources(&self, name: &str) -> ResolvedSources {
        let vertex = self.vertex_source(name);
        let (source, origin) = self.fragment_source(name);
        let (fragment, compilation) = self.compile_fragment(name, source);
        ResolvedSources {
            name: name.to_string(),
            vertex,
            fragment,
            origin,
            compilation,
        }
    }

    /// Imports a shader file and returns the name it was registered under.
    pub fn load_external(
        &mut self,
        reference: Arc<dyn ShaderReference>,
    ) -> Result<String, LoadError> {
        let shader = self.resolver.load_descriptor(reference)?;
        let name = shader.name.clone();
        if self.externals.insert(shader).is_some() {
            debug!(shader = %name, "replaced previously imported shader");
        }
        self.release_program(&name);
        info!(shader = %name, "loaded external shader");
        Ok(name)
    }

    pub fn remove_external(&mut self, name: &str) -> bool {
        let removed = self.externals.remove(name).is_some();
        if removed {
            self.release_program(name);
            debug!(shader = %name, "removed external shader");
        }
        removed
    }

    pub fn external_info(&self, name: &str) -> Option<ExternalShader> {
        self.externals.get(name)
    }

    /// Built-in names in table order, then imported names sorted.
    pub fn available_shaders(&self) -> Vec<String> {
        let mut names: Vec<String> = builtin::builtin_names().map(str::to_string).collect();
        for name in self.externals.names() {
            if !builtin::is_builtin(&name) {
                names.push(name);
            }
        }
        names
    }

    pub fn clear_shader_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Deletes every live program and shuts the native compiler down. The
    /// manager stays usable: the next build initializes the compiler again.
    pub fn cleanup(&mut self) {
        debug!(programs = self.programs.len(), "cleaning up shader manager");
        for (_, built) in self.programs.drain() {
            if self.gpu.is_program(built.program) {
                self.gpu.delete_program(built.program);
            }
        }
        if self.compiler_state == CompilerState::Ready {
            self.compiler.cleanup();
        }
        self.compiler_state = CompilerState::Released;
    }

    fn initialize_compiler(&mut self) {
        self.compiler_state = if self.compiler.initialize() {
            CompilerState::Ready
        } else {
            warn!("native shader compiler unavailable; shaders will be used as written");
            CompilerState::Unavailable
        };
    }

    fn release_program(&mut self, name: &str) {
        if let Some(built) = self.programs.remove(name) {
            if self.gpu.is_program(built.program) {
                self.gpu.delete_program(built.program);
            }
        }
    }

    fn vertex_source(&self, name: &str) -> &'static str {
        if self.externals.contains(name) {
            return DEFAULT_VERTEX_SHADER;
        }
        if !builtin::is_builtin(name) {
            warn!(shader = %name, "unknown shader, using default vertex shader");
        }
        builtin::builtin_or_default(name).vertex
    }

    fn fragment_source(&self, name: &str) -> (String, SourceOrigin) {
        if let Some(shader) = self.externals.get(name) {
            return self.external_fragment(&shader);
        }
        if let Some(shader) = builtin::builtin(name) {
            return (shader.fragment.to_string(), SourceOrigin::Builtin);
        }
        warn!(shader = %name, "unknown shader, using default");
        (
            builtin::builtin_or_default(name).fragment.to_string(),
            SourceOrigin::Default,
        )
    }

    fn external_fragment(&self, shader: &ExternalShader) -> (String, SourceOrigin) {
        match &shader.kind {
            ExternalKind::Direct { sources } => match sources.first() {
                Some(source) => (source.clone(), SourceOrigin::External),
                None => {
                    warn!(shader = %shader.name, "imported shader has no source text");
                    (fallback_fragment_shader().to_string(), SourceOrigin::Fallback)
                }
            },
            ExternalKind::Preset { .. } => match self.resolver.preset_entry_source(shader) {
                Ok(source) => (source, SourceOrigin::Preset),
                Err(err) => {
                    warn!(shader = %shader.name, error = %err, "failed to resolve preset; using generated shader");
                    (fallback_fragment_shader().to_string(), SourceOrigin::Fallback)
                }
            },
        }
    }

    fn compile_fragment(&self, name: &str, source: String) -> (String, FragmentCompilation) {
        if let Some(compiled) = self.cache.lookup(ShaderStage::Fragment, &source) {
            debug!(shader = %name, "using cached fragment shader");
            return (compiled, FragmentCompilation::CacheHit);
        }
        if self.compiler_state != CompilerState::Ready {
            return (source, FragmentCompilation::Uncompiled);
        }
        match self.compiler.compile(&source, ShaderStage::Fragment) {
            Ok(compiled) => {
                debug!(shader = %name, "compiled fragment shader with native compiler");
                self.cache.store(ShaderStage::Fragment, &source, &compiled);
                (compiled, FragmentCompilation::Compiled)
            }
            Err(err) => {
                debug!(shader = %name, error = %err, "using original fragment shader");
                (source, FragmentCompilation::Uncompiled)
            }
        }
    }

    fn build_program(&mut self, name: &str) -> Result<BuiltProgram, ProgramError> {
        if self.compiler_state == CompilerState::Released {
            self.initialize_compiler();
        }
        let sources = self.resolve_sources(name);
        let program = self.link_sources(&sources)?;

        if let Some(previous) = self.programs.remove(name) {
            if previous.program != program && self.gpu.is_program(previous.program) {
                self.gpu.delete_program(previous.program);
            }
        }
        let built = BuiltProgram {
            program,
            origin: sources.origin,
            compilation: sources.compilation,
        };
        self.programs.insert(name.to_string(), built);
        debug!(shader = %name, %program, origin = %sources.origin, "created shader program");
        Ok(built)
    }

    fn link_sources(&mut self, sources: &ResolvedSources) -> Result<ProgramHandle, ProgramError> {
        let vertex = self.compile_stage(&sources.name, ShaderStage::Vertex, sources.vertex)?;
        let fragment = match self.compile_stage(&sources.name, ShaderStage::Fragment, &sources.fragment) {
            Ok(fragment) => fragment,
            Err(err) => {
                self.gpu.delete_stage(vertex);
                return Err(err);
            }
        };

        let result = self.gpu.create_program(vertex, fragment).and_then(|program| {
            match self.gpu.link(program) {
                Ok(()) => Ok(program),
                Err(err) => {
                    self.gpu.delete_program(program);
                    Err(err)
                }
            }
        });
        self.release_stages(vertex, fragment);

        result.map_err(|source| {
            error!(shader = %sources.name, error = %source, "could not link program");
            ProgramError::Link {
                name: sources.name.clone(),
                source,
            }
        })
    }

    fn compile_stage(
        &mut self,
        name: &str,
        stage: ShaderStage,
        source: &str,
    ) -> Result<StageHandle, ProgramError> {
        self.gpu.create_stage(stage, source).map_err(|err| {
            error!(shader = %name, %stage, error = %err, "could not compile shader");
            error!(shader = %name, %stage, code = %source, "shader code");
            ProgramError::StageCompile {
                name: name.to_string(),
                stage,
                source: err,
            }
        })
    }

    fn release_stages(&mut self, vertex: StageHandle, fragment: StageHandle) {
        self.gpu.delete_stage(vertex);
        self.gpu.delete_stage(fragment);
    }
}
