//! Describes user-imported shaders once their bytes have been read, so the
//! renderer can pick a fragment source without touching the original file
//! again (direct shaders) or with only a sibling lookup (presets).
//!
//! Types:
//!
//! - `ExternalFormat` classifies a file name by extension.
//! - `ExternalKind` carries the text captured at import time.
//! - `ExternalShader` pairs the registry name with its reference and kind.
use std::sync::Arc;

use crate::reference::ShaderReference;

pub const PRESET_EXTENSION: &str = ".slangp";
pub const SHADER_EXTENSION: &str = ".slang";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalFormat {
    /// Multi-pass `.slangp` preset.
    Preset,
    /// Single `.slang` shader.
    Shader,
}

impl ExternalFormat {
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        if file_name.ends_with(PRESET_EXTENSION) {
            Some(Self::Preset)
        } else if file_name.ends_with(SHADER_EXTENSION) {
            Some(Self::Shader)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Preset => PRESET_EXTENSION,
            Self::Shader => SHADER_EXTENSION,
        }
    }

    /// Registry name for `file_name`: the file name minus its extension.
    pub fn shader_name(self, file_name: &str) -> String {
        match file_name.strip_suffix(self.extension()) {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => file_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalKind {
    Preset { content: String },
    Direct { sources: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct ExternalShader {
    pub name: String,
    pub reference: Arc<dyn ShaderReference>,
    pub kind: ExternalKind,
}

impl ExternalShader {
    pub fn preset(
        name: impl Into<String>,
        reference: Arc<dyn ShaderReference>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            reference,
            kind: ExternalKind::Preset {
                content: content.into(),
            },
        }
    }

    pub fn direct(
        name: impl Into<String>,
        reference: Arc<dyn ShaderReference>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            reference,
            kind: ExternalKind::Direct {
                sources: vec![source.into()],
            },
        }
    }

    pub fn is_preset(&self) -> bool {
        matches!(self.kind, ExternalKind::Preset { .. })
    }

    /// Raw preset text; `None` for direct shaders.
    pub fn preset_content(&self) -> Option<&str> {
        match &self.kind {
            ExternalKind::Preset { content } => Some(content.as_str()),
            ExternalKind::Direct { .. } => None,
        }
    }

    /// Shader text captured at import; empty for presets.
    pub fn shader_sources(&self) -> &[String] {
        match &self.kind {
            ExternalKind::Direct { sources } => sources,
            ExternalKind::Preset { .. } => &[],
        }
    }
}
