use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ArtifactError;

/// Bump when the compiled output changes meaning; older entries then read as
/// misses without being deleted up front.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Shader compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Numeric tag used as the cache key prefix.
    pub fn discriminator(self) -> u8 {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Fragment => 1,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Lowercase hex SHA-256 of `source`.
pub fn fingerprint(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

/// Key under which the compiled form of `source` is stored.
pub fn cache_key(stage: ShaderStage, source: &str) -> String {
    key_for_fingerprint(stage, &fingerprint(source))
}

pub(crate) fn key_for_fingerprint(stage: ShaderStage, hash: &str) -> String {
    format!("{}_{}", stage.discriminator(), hash)
}

/// Natively compiled source plus the metadata needed to decide freshness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedArtifact {
    pub compiled_source: String,
    /// Fingerprint of the source *before* compilation.
    pub source_hash: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub version: u32,
}

impl CachedArtifact {
    pub fn new(
        compiled_source: impl Into<String>,
        source_hash: impl Into<String>,
        created_at: u64,
        version: u32,
    ) -> Self {
        Self {
            compiled_source: compiled_source.into(),
            source_hash: source_hash.into(),
            created_at,
            version,
        }
    }

    /// Valid iff the schema matches, the recorded fingerprint equals
    /// `source_hash`, and the entry is no older than `max_age` at `now`.
    pub fn is_valid_for(
        &self,
        source_hash: &str,
        schema_version: u32,
        now: u64,
        max_age: Duration,
    ) -> bool {
        if self.version != schema_version {
            return false;
        }
        if self.source_hash != source_hash {
            return false;
        }
        now.saturating_sub(self.created_at) <= max_age.as_millis() as u64
    }

    pub fn encode(&self) -> Result<Vec<u8>, ArtifactError> {
        serde_json::to_vec(self).map_err(ArtifactError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ArtifactError> {
        serde_json::from_slice(bytes).map_err(ArtifactError::Decode)
    }
}
