mod descriptor;
mod reference;
mod registry;
mod resolver;

pub use descriptor::{ExternalFormat, ExternalKind, ExternalShader};
pub use reference::{FileReference, MemoryReference, MemoryTree, ShaderReference};
pub use registry::ExternalRegistry;
pub use resolver::{validate_shader_source, ExternalSourceResolver, LoadError};
