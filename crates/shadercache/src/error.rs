use std::path::PathBuf;

/// Failures raised by a persistent [`ByteStore`](crate::ByteStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid cache key '{0}'")]
    InvalidKey(String),
}

/// A persisted artifact could not be encoded or decoded.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to encode cached artifact: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode cached artifact: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Internal error for persistent-tier work. The cache only ever logs these;
/// callers see a miss or a silently skipped write.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}
