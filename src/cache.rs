//! Memoized pipeline results keyed by file content.
//!
//! Re-viewing the same upload should not re-run the pipeline. The cache is
//! owned by the caller and bounded in time: entries older than the TTL are
//! recomputed and evicted on the next insert.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use log::debug;
use sha2::{Digest, Sha256};

use crate::{
    config::PipelineConfig,
    error::PipelineError,
    pipeline,
    record::EnrichedTable,
};

struct CacheEntry {
    table: Arc<EnrichedTable>,
    stored_at: Instant,
}

pub struct PipelineCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
    runs: usize,
}

/// Hex SHA-256 over the extension hint and the file content.
pub fn content_key(bytes: &[u8], extension: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(extension.trim_start_matches('.').to_ascii_lowercase().as_bytes());
    hasher.update([0u8]);
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

impl PipelineCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
            runs: 0,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(Duration::from_secs(config.cache_ttl_secs))
    }

    /// Returns the cached table for this content, running the pipeline when
    /// there is no fresh entry. Failed runs are not cached.
    pub fn get_or_enrich(
        &mut self,
        bytes: &[u8],
        extension: &str,
        config: &PipelineConfig,
    ) -> Result<Arc<EnrichedTable>, PipelineError> {
        let key = content_key(bytes, extension);
        let now = Instant::now();
        if let Some(entry) = self.entries.get(&key)
            && now.duration_since(entry.stored_at) < self.ttl
        {
            debug!("Pipeline cache hit for {}", &key[..12]);
            return Ok(Arc::clone(&entry.table));
        }

        let table = Arc::new(pipeline::enrich(bytes, extension, config)?);
        self.runs += 1;
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.duration_since(entry.stored_at) < ttl);
        self.entries.insert(
            key,
            CacheEntry {
                table: Arc::clone(&table),
                stored_at: now,
            },
        );
        Ok(table)
    }

    /// Number of pipeline runs performed through this cache.
    pub fn runs(&self) -> usize {
        self.runs
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
