use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::artifact::{
    cache_key, fingerprint, key_for_fingerprint, CachedArtifact, ShaderStage, CACHE_SCHEMA_VERSION,
};
use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;
use crate::store::{ByteStore, MemoryStore};

/// Entries older than this are never served.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Upper bound on the memory tier after an eviction pass.
pub const DEFAULT_MEMORY_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_age: Duration,
    pub memory_capacity: usize,
    pub schema_version: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            schema_version: CACHE_SCHEMA_VERSION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub persistent_entries: usize,
    pub persistent_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvictionReport {
    pub expired_persistent: usize,
    pub trimmed_memory: usize,
}

/// Two-tier compiled shader cache.
///
/// The memory tier is consulted first; a persistent hit is promoted into
/// memory. Any entry failing the freshness check is dropped from the tier it
/// was found in and reported as a miss.
pub struct ShaderCache {
    memory: DashMap<String, CachedArtifact>,
    persistent: Box<dyn ByteStore>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl ShaderCache {
    pub fn new(persistent: impl ByteStore + 'static, config: CacheConfig) -> Self {
        Self::with_clock(persistent, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        persistent: impl ByteStore + 'static,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Self {
            memory: DashMap::new(),
            persistent: Box::new(persistent),
            config,
            clock,
        };
        let report = cache.evict();
        if report.expired_persistent > 0 {
            debug!(
                removed = report.expired_persistent,
                "removed expired shader cache entries"
            );
        }
        cache
    }

    /// Cache whose persistent tier lives in process memory only.
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(MemoryStore::new(), config)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the compiled text previously stored for `source`, if fresh.
    pub fn lookup(&self, stage: ShaderStage, source: &str) -> Option<String> {
        let hash = fingerprint(source);
        let key = key_for_fingerprint(stage, &hash);
        let now = self.clock.now_millis();

        let cached = self.memory.get(&key).map(|entry| entry.value().clone());
        if let Some(cached) = cached {
            if self.is_fresh(&cached, &hash, now) {
                debug!(%key, "shader cache hit (memory)");
                return Some(cached.compiled_source);
            }
            debug!(%key, "dropping stale memory entry");
            self.memory.remove(&key);
        }

        match self.load_persistent(&key) {
            Ok(Some(artifact)) if self.is_fresh(&artifact, &hash, now) => {
                debug!(%key, "shader cache hit (disk)");
                let compiled = artifact.compiled_source.clone();
                self.memory.insert(key, artifact);
                self.trim_memory();
                return Some(compiled);
            }
            Ok(Some(_)) => {
                debug!(%key, "dropping stale persisted entry");
                self.drop_persistent(&key);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(%key, error = %err, "failed to load cache file; removing it");
                self.drop_persistent(&key);
            }
        }

        debug!(%key, "shader cache miss");
        None
    }

    /// Records `compiled` as the native output for `source`. The persistent
    /// write is best-effort; the memory copy is always kept.
    pub fn store(&self, stage: ShaderStage, source: &str, compiled: &str) {
        let hash = fingerprint(source);
        let key = key_for_fingerprint(stage, &hash);
        let artifact = CachedArtifact::new(
            compiled,
            hash,
            self.clock.now_millis(),
            self.config.schema_version,
        );

        self.memory.insert(key.clone(), artifact.clone());
        if let Err(err) = self.persist(&key, &artifact) {
            warn!(%key, error = %err, "failed to save cache file");
        }
        self.trim_memory();
        debug!(%key, "cached compiled shader");
    }

    /// Deletes expired persistent entries and trims the memory tier.
    pub fn evict(&self) -> EvictionReport {
        EvictionReport {
            expired_persistent: self.evict_expired_persistent(),
            trimmed_memory: self.trim_memory(),
        }
    }

    /// Empties both tiers.
    pub fn clear(&self) {
        debug!("clearing shader cache");
        self.memory.clear();
        match self.persistent.list_keys() {
            Ok(keys) => {
                for key in keys {
                    self.drop_persistent(&key);
                }
            }
            Err(err) => warn!(error = %err, "failed to enumerate shader cache for clearing"),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let keys = match self.persistent.list_keys() {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "failed to enumerate shader cache");
                Vec::new()
            }
        };
        let persistent_bytes = keys
            .iter()
            .filter_map(|key| self.persistent.size_of(key).ok().flatten())
            .sum();
        CacheStats {
            memory_entries: self.memory.len(),
            persistent_entries: keys.len(),
            persistent_bytes,
        }
    }

    /// True when a fresh entry for `source` is held in memory, without
    /// touching the persistent tier.
    pub fn contains_in_memory(&self, stage: ShaderStage, source: &str) -> bool {
        self.memory.contains_key(&cache_key(stage, source))
    }

    fn is_fresh(&self, artifact: &CachedArtifact, hash: &str, now: u64) -> bool {
        artifact.is_valid_for(hash, self.config.schema_version, now, self.config.max_age)
    }

    fn load_persistent(&self, key: &str) -> Result<Option<CachedArtifact>, CacheError> {
        let Some(bytes) = self.persistent.get(key)? else {
            return Ok(None);
        };
        Ok(Some(CachedArtifact::decode(&bytes)?))
    }

    fn persist(&self, key: &str, artifact: &CachedArtifact) -> Result<(), CacheError> {
        let bytes = artifact.encode()?;
        self.persistent.put(key, &bytes)?;
        Ok(())
    }

    fn drop_persistent(&self, key: &str) {
        if let Err(err) = self.persistent.delete(key) {
            warn!(%key, error = %err, "failed to delete shader cache entry");
        }
    }

    fn evict_expired_persistent(&self) -> usize {
        let keys = match self.persistent.list_keys() {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "failed to enumerate shader cache for eviction");
                return 0;
            }
        };

        let now = self.clock.now_millis();
        let max_age = self.config.max_age.as_millis() as u64;
        let mut removed = 0;
        for key in keys {
            match self.persistent.last_modified(&key) {
                Ok(Some(modified)) if now.saturating_sub(modified) > max_age => {
                    match self.persistent.delete(&key) {
                        Ok(()) => {
                            debug!(%key, "removed old cache file");
                            removed += 1;
                        }
                        Err(err) => warn!(%key, error = %err, "failed to remove old cache file"),
                    }
                }
                Ok(_) => {}
                Err(err) => warn!(%key, error = %err, "failed to stat cache file"),
            }
        }
        removed
    }

    /// Drops the oldest entries by creation time until the memory tier fits.
    fn trim_memory(&self) -> usize {
        let excess = self.memory.len().saturating_sub(self.config.memory_capacity);
        if excess == 0 {
            return 0;
        }

        let mut entries: Vec<(String, u64)> = self
            .memory
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().created_at))
            .collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let mut removed = 0;
        for (key, _) in entries.into_iter().take(excess) {
            if self.memory.remove(&key).is_some() {
                removed += 1;
            }
        }
        debug!(removed, "trimmed memory cache");
        removed
    }
}

impl std::fmt::Debug for ShaderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderCache")
            .field("memory_entries", &self.memory.len())
            .field("config", &self.config)
            .finish()
    }
}
