//! Turns file references into `ExternalShader` descriptors and reads the
//! shader text a preset points at.
//!
//! Functions:
//!
//! - `ExternalSourceResolver::load_descriptor` classifies by extension and
//!   captures the file text.
//! - `ExternalSourceResolver::read_text` reads a reference as UTF-8.
//! - `ExternalSourceResolver::resolve_sibling` walks a preset-relative path
//!   from the preset's parent container.
//! - `ExternalSourceResolver::preset_entry_source` parses a preset and loads
//!   the shader for pass 0.
//! - `validate_shader_source` is the soft `#version` + `main` heuristic.
use std::io::{self, Read};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::descriptor::{ExternalFormat, ExternalShader};
use crate::reference::ShaderReference;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported shader file type: {0}")]
    UnsupportedType(String),

    #[error("shader reference not found: {0}")]
    NotFound(String),

    #[error("preset '{0}' does not name a shader for pass 0")]
    EmptyPreset(String),

    #[error("failed to read {reference}: {source}")]
    Io {
        reference: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalSourceResolver;

impl ExternalSourceResolver {
    pub fn new() -> Self {
        Self
    }

    /// Extensions accepted by [`load_descriptor`](Self::load_descriptor), without the dot.
    pub fn supported_extensions() -> [&'static str; 2] {
        ["slangp", "slang"]
    }

    pub fn load_descriptor(
        &self,
        reference: Arc<dyn ShaderReference>,
    ) -> Result<ExternalShader, LoadError> {
        let file_name = reference
            .display_name()
            .ok_or_else(|| LoadError::NotFound(reference.describe()))?;
        debug!(file = %file_name, "loading shader from reference");

        let Some(format) = ExternalFormat::from_file_name(&file_name) else {
            warn!(file = %file_name, "unsupported file type");
            return Err(LoadError::UnsupportedType(file_name));
        };

        let content = self.read_text(reference.as_ref())?;
        let name = format.shader_name(&file_name);
        if format == ExternalFormat::Shader && !validate_shader_source(&content) {
            debug!(shader = %name, "shader lacks a #version pragma or main entry point");
        }

        Ok(match format {
            ExternalFormat::Preset => ExternalShader::preset(name, reference, content),
            ExternalFormat::Shader => ExternalShader::direct(name, reference, content),
        })
    }

    /// Reads the whole stream as UTF-8.
    pub fn read_text(&self, reference: &dyn ShaderReference) -> Result<String, LoadError> {
        let io_error = |source| LoadError::Io {
            reference: reference.describe(),
            source,
        };
        let mut reader = reference.open().map_err(io_error)?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(io_error)?;
        String::from_utf8(bytes)
            .map_err(|err| io_error(io::Error::new(io::ErrorKind::InvalidData, err)))
    }

    /// Resolves `relative_path` against the container holding `preset`.
    pub fn resolve_sibling(
        &self,
        preset: &dyn ShaderReference,
        relative_path: &str,
    ) -> Result<Arc<dyn ShaderReference>, LoadError> {
        let not_found = || LoadError::NotFound(format!("{} (from {})", relative_path, preset.describe()));
        if relative_path.starts_with('/') || relative_path.starts_with('\\') {
            return Err(not_found());
        }

        let segments: Vec<&str> = relative_path
            .split(['/', '\\'])
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect();
        if segments.is_empty() {
            return Err(not_found());
        }

        let mut current = preset.parent().ok_or_else(not_found)?;
        for segment in segments {
            current = if segment == ".." {
                current.parent()
            } else {
                current.child(segment)
            }
            .ok_or_else(not_found)?;
        }
        Ok(current)
    }

    /// Loads the text of `relative_path` named inside `preset`.
    pub fn load_preset_shader(
        &self,
        preset: &dyn ShaderReference,
        relative_path: &str,
    ) -> Result<String, LoadError> {
        let shader = self.resolve_sibling(preset, relative_path)?;
        self.read_text(shader.as_ref())
    }

    /// Fragment text for the first pass of a preset descriptor.
    pub fn preset_entry_source(&self, shader: &ExternalShader) -> Result<String, LoadError> {
        let content = shader
            .preset_content()
            .ok_or_else(|| LoadError::EmptyPreset(shader.name.clone()))?;
        let parsed = slangp::parse(content);
        let path = parsed
            .first_shader_path()
            .ok_or_else(|| LoadError::EmptyPreset(shader.name.clone()))?;
        debug!(shader = %shader.name, pass = path, declared = parsed.shader_count, "loading preset entry pass");
        self.load_preset_shader(shader.reference.as_ref(), path)
    }

    pub fn validate(&self, content: &str) -> bool {
        validate_shader_source(content)
    }
}

/// Soft sanity check: a `#version` pragma plus a `main` entry point.
pub fn validate_shader_source(content: &str) -> bool {
    content.contains("#version") && (content.contains("void main") || content.contains("main()"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ExternalKind;
    use crate::reference::{FileReference, MemoryTree};

    const PRESET: &str = "shaders = 2\nshader0 = \"shaders/tint.slang\"\nshader1 = ../common/blur.slang\n";

    fn library() -> MemoryTree {
        MemoryTree::new()
            .with_file("crt/tint.slangp", PRESET)
            .with_file("crt/shaders/tint.slang", "#version 450\nvoid main() {}")
            .with_file("common/blur.slang", "#version 450\nvoid main() { blur(); }")
            .with_file("notes.txt", "hello")
    }

    #[test]
    fn classifies_preset_direct_and_unsupported() {
        let resolver = ExternalSourceResolver::new();

        let preset = resolver
            .load_descriptor(Arc::new(library().reference("crt/tint.slangp")))
            .expect("preset");
        assert_eq!(preset.name, "tint");
        assert!(preset.is_preset());
        assert_eq!(preset.preset_content(), Some(PRESET));

        let direct = resolver
            .load_descriptor(Arc::new(library().reference("crt/shaders/tint.slang")))
            .expect("direct");
        assert!(!direct.is_preset());
        assert_eq!(
            direct.kind,
            ExternalKind::Direct {
                sources: vec!["#version 450\nvoid main() {}".to_string()]
            }
        );

        let err = resolver
            .load_descriptor(Arc::new(library().reference("notes.txt")))
            .unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedType(name) if name == "notes.txt"));
    }

    #[test]
    fn missing_file_reports_io_error() {
        let resolver = ExternalSourceResolver::new();
        let err = resolver
            .load_descriptor(Arc::new(library().reference("crt/missing.slang")))
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn invalid_utf8_is_reported_not_raised() {
        let resolver = ExternalSourceResolver::new();
        let tree = MemoryTree::new().with_file("bad.slang", vec![0xff, 0xfe, 0x00]);
        let err = resolver.read_text(&tree.reference("bad.slang")).unwrap_err();
        match err {
            LoadError::Io { source, .. } => assert_eq!(source.kind(), io::ErrorKind::InvalidData),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn siblings_resolve_relative_to_preset_container() {
        let resolver = ExternalSourceResolver::new();
        let preset = library().reference("crt/tint.slangp");

        let text = resolver
            .load_preset_shader(&preset, "./shaders/tint.slang")
            .expect("nested sibling");
        assert!(text.contains("void main() {}"));

        let text = resolver
            .load_preset_shader(&preset, "../common/blur.slang")
            .expect("parent sibling");
        assert!(text.contains("blur();"));

        for bad in ["/crt/shaders/tint.slang", "", "shaders/absent.slang", "../../escape.slang"] {
            assert!(
                matches!(resolver.resolve_sibling(&preset, bad), Err(LoadError::NotFound(_))),
                "{bad} should not resolve"
            );
        }
    }

    #[test]
    fn preset_entry_source_uses_pass_zero() {
        let resolver = ExternalSourceResolver::new();
        let preset = resolver
            .load_descriptor(Arc::new(library().reference("crt/tint.slangp")))
            .unwrap();
        let source = resolver.preset_entry_source(&preset).expect("entry");
        assert_eq!(source, "#version 450\nvoid main() {}");
    }

    #[test]
    fn preset_without_pass_zero_is_empty() {
        let resolver = ExternalSourceResolver::new();
        let tree = MemoryTree::new().with_file("p.slangp", "shaders = 1\nshader1 = a.slang");
        let preset = resolver.load_descriptor(Arc::new(tree.reference("p.slangp"))).unwrap();
        assert!(matches!(
            resolver.preset_entry_source(&preset),
            Err(LoadError::EmptyPreset(name)) if name == "p"
        ));
    }

    #[test]
    fn sibling_lookup_ignores_working_directory() {
        let temp = tempfile::tempdir().unwrap();
        let presets = temp.path().join("presets");
        std::fs::create_dir_all(presets.join("shaders")).unwrap();
        std::fs::write(presets.join("glow.slangp"), "shader0 = shaders/glow.slang").unwrap();
        std::fs::write(presets.join("shaders/glow.slang"), "#version 450\nvoid main() {}").unwrap();

        let resolver = ExternalSourceResolver::new();
        let preset = resolver
            .load_descriptor(Arc::new(FileReference::new(presets.join("glow.slangp"))))
            .unwrap();
        assert!(resolver.preset_entry_source(&preset).is_ok());
    }

    #[test]
    fn relative_preset_path_reaches_parent_of_working_directory() {
        // Tests run from this crate's directory, next to `crates/slangp`.
        let resolver = ExternalSourceResolver::new();
        let preset = FileReference::new("Cargo.toml");
        let text = resolver
            .load_preset_shader(&preset, "../slangp/Cargo.toml")
            .expect("sibling crate manifest");
        assert!(text.contains("name = \"slangp\""), "{text}");

        assert!(matches!(
            resolver.resolve_sibling(&preset, "../Cargo.toml"),
            Err(LoadError::NotFound(_))
        ));
    }

    #[test]
    fn validation_heuristic() {
        assert!(validate_shader_source("#version 450\nvoid main() {}"));
        assert!(validate_shader_source("#version 100\nint main() { }"));
        assert!(!validate_shader_source("void main() {}"));
        assert!(!validate_shader_source("#version 450\nvoid entry() {}"));
    }
}
