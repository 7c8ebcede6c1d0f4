//! `config.toml` loading.
//!
//! ```toml
//! [cache]
//! max_age = "7d"
//! memory_entries = 50
//!
//! [overlay]
//! shader = "crt"
//! opacity = 0.8
//! performance = "balanced"
//! shaders = ["presets/royale.slangp"]
//! ```
//!
//! Every key is optional. Relative `shaders` entries resolve against the
//! directory holding the config file.
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use shadercache::{CacheConfig, DEFAULT_MAX_AGE, DEFAULT_MEMORY_CAPACITY};

pub const DEFAULT_OPACITY: f32 = 0.8;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub cache: CacheSection,
    pub overlay: OverlaySettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    #[serde(deserialize_with = "deserialize_duration")]
    pub max_age: Duration,
    pub memory_entries: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            memory_entries: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl CacheSection {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_age: self.max_age,
            memory_capacity: self.memory_entries,
            ..CacheConfig::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PerformanceMode {
    HighQuality,
    #[default]
    Balanced,
    BatterySaver,
}

impl fmt::Display for PerformanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerformanceMode::HighQuality => f.write_str("high-quality"),
            PerformanceMode::Balanced => f.write_str("balanced"),
            PerformanceMode::BatterySaver => f.write_str("battery-saver"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverlaySettings {
    pub shader: String,
    #[serde(deserialize_with = "deserialize_opacity")]
    pub opacity: f32,
    pub performance: PerformanceMode,
    pub shaders: Vec<PathBuf>,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            shader: "crt".to_string(),
            opacity: DEFAULT_OPACITY,
            performance: PerformanceMode::default(),
            shaders: Vec::new(),
        }
    }
}

impl Config {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config {}", path.display()))
            }
        };
        let mut config = Self::parse(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.overlay.anchor_shader_paths(base);
        }
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

impl OverlaySettings {
    fn anchor_shader_paths(&mut self, base: &Path) {
        for path in &mut self.shaders {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Clamps into `0.0..=1.0`; non-finite values fall back to the default.
pub fn clamp_opacity(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        DEFAULT_OPACITY
    }
}

fn deserialize_opacity<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    f32::deserialize(deserializer).map(clamp_opacity)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }
    }

    deserializer.deserialize_any(Visitor)
}
