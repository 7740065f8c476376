//! In-memory resource cache.
//!
//! Used for tests and for deployments that only serve on demand and can
//! afford to recompute after a restart.

use dashmap::DashMap;

use crate::cache::stats::CacheCounters;
use crate::cache::traits::{BoxFuture, CacheError, ResourceCache};
use crate::cache::CacheStats;
use crate::coord::TileAddress;

/// Resource cache backed by a concurrent hash map.
#[derive(Debug, Default)]
pub struct MemoryResourceCache {
    entries: DashMap<String, Vec<u8>>,
    counters: CacheCounters,
}

impl MemoryResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored keys (relative paths), sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

impl ResourceCache for MemoryResourceCache {
    fn exists<'a>(&'a self, addr: &'a TileAddress) -> BoxFuture<'a, Result<bool, CacheError>> {
        Box::pin(async move { Ok(self.entries.contains_key(&addr.relative_path())) })
    }

    fn read<'a>(&'a self, addr: &'a TileAddress) -> BoxFuture<'a, Result<Vec<u8>, CacheError>> {
        Box::pin(async move {
            let key = addr.relative_path();
            match self.entries.get(&key) {
                Some(data) => {
                    self.counters.record_hit();
                    Ok(data.value().clone())
                }
                None => {
                    self.counters.record_miss();
                    Err(CacheError::NotFound(key))
                }
            }
        })
    }

    fn write<'a>(
        &'a self,
        addr: &'a TileAddress,
        data: Vec<u8>,
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            self.counters.record_write(data.len());
            self.entries.insert(addr.relative_path(), data);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, addr: &'a TileAddress) -> BoxFuture<'a, Result<bool, CacheError>> {
        Box::pin(async move {
            let removed = self.entries.remove(&addr.relative_path()).is_some();
            if removed {
                self.counters.record_deletes(1);
            }
            Ok(removed)
        })
    }

    fn delete_all<'a>(&'a self, dataset: &'a str) -> BoxFuture<'a, Result<u64, CacheError>> {
        Box::pin(async move {
            let prefix = format!("{}/", dataset);
            let before = self.entries.len();
            self.entries.retain(|key, _| !key.starts_with(&prefix));
            let removed = (before - self.entries.len()) as u64;
            self.counters.record_deletes(removed);
            Ok(removed)
        })
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}
