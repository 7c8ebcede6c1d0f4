//! Content-addressed cache for natively compiled shader source.
//!
//! Compiled text is keyed by the stage and a SHA-256 fingerprint of the
//! *pre-compilation* source, never by shader name, so two shaders with the
//! same body share one entry and an edited shader misses automatically.
//!
//! Types:
//!
//! - `ShaderCache` layers a `DashMap` memory tier over any `ByteStore`,
//!   promoting persistent hits into memory and enforcing age, schema and
//!   capacity policies.
//! - `ByteStore` is the persistent tier boundary; `FsStore` writes one
//!   `<key>.cache` file per entry and `MemoryStore` keeps bytes in process.
//! - `CachedArtifact` is the serialized record stored under each key.
//! - `Clock` supplies timestamps so expiry can be exercised deterministically.
mod artifact;
mod cache;
mod clock;
mod error;
mod store;

pub use artifact::{cache_key, fingerprint, CachedArtifact, ShaderStage, CACHE_SCHEMA_VERSION};
pub use cache::{
    CacheConfig, CacheStats, EvictionReport, ShaderCache, DEFAULT_MAX_AGE, DEFAULT_MEMORY_CAPACITY,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ArtifactError, CacheError, StoreError};
pub use store::{ByteStore, FsStore, MemoryStore, CACHE_DIR, ENTRY_EXTENSION};
