//! Shader program pipeline for the overlay.
//!
//! `ShaderManager` resolves a shader name to source text, consults the
//! content-addressed cache, runs the native compiler and links the result on
//! a `GpuBackend`. `RenderThread` owns a manager on its own thread so the GPU
//! is only touched from one place.
mod backend;
mod builtin;
mod manager;
mod native;
mod thread;

pub use backend::{GpuBackend, GpuError, HeadlessBackend, ProgramHandle, StageHandle};
pub use builtin::{
    builtin, builtin_names, builtin_or_default, fallback_fragment_shader, is_builtin,
    BuiltinShader, BUILTIN_SHADERS, DEFAULT_SHADER, DEFAULT_VERTEX_SHADER,
};
pub use manager::{
    BuiltProgram, FragmentCompilation, ProgramError, ResolvedSources, ShaderManager, SourceOrigin,
};
#[cfg(feature = "shaderc")]
pub use native::ShadercCompiler;
pub use native::{CompileError, CompilerKind, NativeCompiler, PassthroughCompiler};
pub use shadercache::ShaderStage;
pub use thread::{RenderThread, RenderThreadError};
