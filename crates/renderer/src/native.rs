use std::fmt;

use shadercache::ShaderStage;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("shader source is empty")]
    Empty,
    #[error("native compiler is not initialised")]
    Unavailable,
    #[error("{stage} shader failed to compile: {message}")]
    Failed { stage: ShaderStage, message: String },
}

/// Source-to-source compiler run before the GPU sees a fragment shader.
///
/// `initialize` and `cleanup` must tolerate repeated calls. A failed
/// `compile` is not fatal to the caller; the uncompiled source is used.
pub trait NativeCompiler: Send {
    fn initialize(&mut self) -> bool;
    fn compile(&self, source: &str, stage: ShaderStage) -> Result<String, CompileError>;
    fn validate(&self, source: &str, stage: ShaderStage) -> bool;
    fn cleanup(&mut self);
}

/// Native compiler backend requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerKind {
    /// Normalise whitespace only.
    Passthrough,
    /// Run the shaderc GLSL preprocessor.
    Shaderc,
}

impl Default for CompilerKind {
    fn default() -> Self {
        if cfg!(feature = "shaderc") {
            CompilerKind::Shaderc
        } else {
            CompilerKind::Passthrough
        }
    }
}

impl fmt::Display for CompilerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilerKind::Passthrough => f.write_str("passthrough"),
            CompilerKind::Shaderc => f.write_str("shaderc"),
        }
    }
}

impl CompilerKind {
    /// Instantiates the backend. Falls back to passthrough when shaderc
    /// support is not compiled in.
    pub fn create(self) -> Box<dyn NativeCompiler> {
        match self {
            CompilerKind::Passthrough => Box::new(PassthroughCompiler::default()),
            #[cfg(feature = "shaderc")]
            CompilerKind::Shaderc => Box::new(ShadercCompiler::default()),
            #[cfg(not(feature = "shaderc"))]
            CompilerKind::Shaderc => {
                tracing::warn!("shaderc support is not enabled in this build; using passthrough");
                Box::new(PassthroughCompiler::default())
            }
        }
    }
}

/// Normalises line endings and strips trailing whitespace.
#[derive(Debug, Default)]
pub struct PassthroughCompiler {
    ready: bool,
}

impl NativeCompiler for PassthroughCompiler {
    fn initialize(&mut self) -> bool {
        self.ready = true;
        true
    }

    fn compile(&self, source: &str, stage: ShaderStage) -> Result<String, CompileError> {
        if !self.ready {
            return Err(CompileError::Unavailable);
        }
        if source.trim().is_empty() {
            return Err(CompileError::Empty);
        }
        let mut output = String::with_capacity(source.len());
        for line in source.lines() {
            output.push_str(line.trim_end());
            output.push('\n');
        }
        debug!(%stage, bytes = output.len(), "normalised shader source");
        Ok(output)
    }

    fn validate(&self, source: &str, _stage: ShaderStage) -> bool {
        shadersource::validate_shader_source(source)
    }

    fn cleanup(&mut self) {
        self.ready = false;
    }
}

#[cfg(feature = "shaderc")]
pub use self::shaderc_backend::ShadercCompiler;

#[cfg(feature = "shaderc")]
mod shaderc_backend {
    use shadercache::ShaderStage;
    use tracing::{debug, warn};

    use super::{CompileError, NativeCompiler};

    /// Preprocesses GLSL through shaderc; `validate` performs a full SPIR-V
    /// compile and discards the binary.
    #[derive(Debug, Default)]
    pub struct ShadercCompiler {
        ready: bool,
    }

    impl ShadercCompiler {
        fn compiler(&self) -> Result<shaderc::Compiler, CompileError> {
            if !self.ready {
                return Err(CompileError::Unavailable);
            }
            shaderc::Compiler::new().map_err(|_| CompileError::Unavailable)
        }
    }

    fn file_name(stage: ShaderStage) -> &'static str {
        match stage {
            ShaderStage::Vertex => "overlay.vert",
            ShaderStage::Fragment => "overlay.frag",
        }
    }

    fn shader_kind(stage: ShaderStage) -> shaderc::ShaderKind {
        match stage {
            ShaderStage::Vertex => shaderc::ShaderKind::Vertex,
            ShaderStage::Fragment => shaderc::ShaderKind::Fragment,
        }
    }

    impl NativeCompiler for ShadercCompiler {
        fn initialize(&mut self) -> bool {
            if !self.ready {
                self.ready = shaderc::Compiler::new().is_ok();
                if !self.ready {
                    warn!("failed to create shaderc compiler");
                }
            }
            self.ready
        }

        fn compile(&self, source: &str, stage: ShaderStage) -> Result<String, CompileError> {
            if source.trim().is_empty() {
                return Err(CompileError::Empty);
            }
            let compiler = self.compiler()?;
            let artifact = compiler
                .preprocess(source, file_name(stage), "main", None)
                .map_err(|err| CompileError::Failed {
                    stage,
                    message: err.to_string(),
                })?;
            if artifact.get_num_warnings() > 0 {
                debug!(%stage, warnings = %artifact.get_warning_messages(), "shaderc warnings");
            }
            Ok(artifact.as_text())
        }

        fn validate(&self, source: &str, stage: ShaderStage) -> bool {
            let Ok(compiler) = self.compiler() else {
                return false;
            };
            compiler
                .compile_into_spirv(source, shader_kind(stage), file_name(stage), "main", None)
                .is_ok()
        }

        fn cleanup(&mut self) {
            self.ready = false;
        }
    }
}
