//! On-disk resource cache.
//!
//! # File Layout
//!
//! ```text
//! {root}/{dataset}/{collection}/{subtree|content}/{level}_{x}_{y}
//! ```
//!
//! Writes go to a uniquely named `*.tmp` sibling first and are renamed into
//! place, so concurrent readers see either the old or the new value.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::cache::path::{dataset_directory, resource_path};
use crate::cache::stats::CacheCounters;
use crate::cache::traits::{BoxFuture, CacheError, ResourceCache};
use crate::cache::CacheStats;
use crate::coord::TileAddress;

/// Resource cache storing one file per address.
#[derive(Debug)]
pub struct DiskResourceCache {
    /// Cache root directory
    root: PathBuf,
    /// Sequence for unique temp file names
    temp_seq: AtomicU64,
    counters: CacheCounters,
}

impl DiskResourceCache {
    /// Open (and create if needed) a cache rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            CacheError::Unavailable(format!("cannot create {}: {}", root.display(), e))
        })?;

        info!(dir = %root.display(), "Disk resource cache opened");

        Ok(Self {
            root,
            temp_seq: AtomicU64::new(0),
            counters: CacheCounters::default(),
        })
    }

    /// Cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn temp_path(&self, path: &Path) -> PathBuf {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!("{}.{}-{}.tmp", name, std::process::id(), seq))
    }

    async fn write_atomic(&self, path: PathBuf, data: &[u8]) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = self.temp_path(&path);
        if let Err(e) = tokio::fs::write(&temp_path, data).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(CacheError::Io(e));
        }
        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(CacheError::Io(e));
        }
        Ok(())
    }
}

impl ResourceCache for DiskResourceCache {
    fn exists<'a>(&'a self, addr: &'a TileAddress) -> BoxFuture<'a, Result<bool, CacheError>> {
        Box::pin(async move {
            let path = resource_path(&self.root, addr)?;
            Ok(tokio::fs::try_exists(&path).await?)
        })
    }

    fn read<'a>(&'a self, addr: &'a TileAddress) -> BoxFuture<'a, Result<Vec<u8>, CacheError>> {
        Box::pin(async move {
            let path = resource_path(&self.root, addr)?;
            match tokio::fs::read(&path).await {
                Ok(data) => {
                    self.counters.record_hit();
                    Ok(data)
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    self.counters.record_miss();
                    Err(CacheError::NotFound(addr.relative_path()))
                }
                Err(e) => Err(CacheError::Io(e)),
            }
        })
    }

    fn write<'a>(
        &'a self,
        addr: &'a TileAddress,
        data: Vec<u8>,
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            let path = resource_path(&self.root, addr)?;
            match self.write_atomic(path, &data).await {
                Ok(()) => {
                    self.counters.record_write(data.len());
                    debug!(addr = %addr, bytes = data.len(), "Cached resource written");
                    Ok(())
                }
                Err(e) => {
                    self.counters.record_write_failure();
                    Err(e)
                }
            }
        })
    }

    fn delete<'a>(&'a self, addr: &'a TileAddress) -> BoxFuture<'a, Result<bool, CacheError>> {
        Box::pin(async move {
            let path = resource_path(&self.root, addr)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    self.counters.record_deletes(1);
                    Ok(true)
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(CacheError::Io(e)),
            }
        })
    }

    fn delete_all<'a>(&'a self, dataset: &'a str) -> BoxFuture<'a, Result<u64, CacheError>> {
        Box::pin(async move {
            let dir = dataset_directory(&self.root, dataset)?;
            if !tokio::fs::try_exists(&dir).await? {
                return Ok(0);
            }

            let scan_dir = dir.clone();
            let count = tokio::task::spawn_blocking(move || count_files(&scan_dir))
                .await
                .map_err(|e| CacheError::Unavailable(format!("purge scan failed: {}", e)))?;

            tokio::fs::remove_dir_all(&dir).await.map_err(|e| {
                warn!(dir = %dir.display(), error = %e, "Failed to purge dataset directory");
                CacheError::Unavailable(format!("cannot purge {}: {}", dir.display(), e))
            })?;

            self.counters.record_deletes(count);
            info!(dataset, removed = count, "Dataset purged from disk cache");
            Ok(count)
        })
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}

/// Recursively count regular files below `dir`.
fn count_files(dir: &Path) -> u64 {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Failed to read directory during purge scan");
            return 0;
        }
    };

    let mut count = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            count += count_files(&path);
        } else {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::ResourceKind;
    use tempfile::TempDir;

    async fn create_test_cache() -> (TempDir, DiskResourceCache) {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskResourceCache::open(temp_dir.path().join("cache"))
            .await
            .unwrap();
        (temp_dir, cache)
    }

    fn addr(dataset: &str, kind: ResourceKind, level: u8, x: u32, y: u32) -> TileAddress {
        TileAddress::new(dataset, "buildings", kind, level, x, y).unwrap()
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (_temp, cache) = create_test_cache().await;
        let a = addr("ds", ResourceKind::Subtree, 2, 1, 3);

        cache.write(&a, vec![1, 2, 3]).await.unwrap();

        assert!(cache.exists(&a).await.unwrap());
        assert_eq!(cache.read(&a).await.unwrap(), vec![1, 2, 3]);
        assert!(cache
            .root()
            .join("ds/buildings/subtree/2_1_3")
            .is_file());
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let (_temp, cache) = create_test_cache().await;
        let a = addr("ds", ResourceKind::Content, 0, 0, 0);

        let err = cache.read(&a).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!cache.exists(&a).await.unwrap());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_wholesale() {
        let (_temp, cache) = create_test_cache().await;
        let a = addr("ds", ResourceKind::Content, 1, 0, 1);

        cache.write(&a, vec![9; 100]).await.unwrap();
        cache.write(&a, vec![4, 5]).await.unwrap();

        assert_eq!(cache.read(&a).await.unwrap(), vec![4, 5]);
    }

    #[tokio::test]
    async fn test_no_temp_files_remain() {
        let (_temp, cache) = create_test_cache().await;
        let a = addr("ds", ResourceKind::Subtree, 0, 0, 0);

        cache.write(&a, vec![1, 2, 3]).await.unwrap();

        let dir = cache.root().join("ds/buildings/subtree");
        let temps: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(temps.is_empty(), "Temp files should not remain");
    }

    #[tokio::test]
    async fn test_delete() {
        let (_temp, cache) = create_test_cache().await;
        let a = addr("ds", ResourceKind::Subtree, 0, 0, 0);

        cache.write(&a, vec![1]).await.unwrap();
        assert!(cache.delete(&a).await.unwrap());
        assert!(!cache.exists(&a).await.unwrap());
        assert!(!cache.delete(&a).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_all_only_touches_one_dataset() {
        let (_temp, cache) = create_test_cache().await;
        let a = addr("ds1", ResourceKind::Subtree, 0, 0, 0);
        let b = addr("ds1", ResourceKind::Content, 1, 1, 1);
        let c = addr("ds2", ResourceKind::Subtree, 0, 0, 0);

        for x in [&a, &b, &c] {
            cache.write(x, vec![7]).await.unwrap();
        }

        assert_eq!(cache.delete_all("ds1").await.unwrap(), 2);
        assert!(!cache.exists(&a).await.unwrap());
        assert!(!cache.exists(&b).await.unwrap());
        assert!(cache.exists(&c).await.unwrap());

        assert_eq!(cache.delete_all("ds1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_disjoint_addresses() {
        let (_temp, cache) = create_test_cache().await;
        let cache = std::sync::Arc::new(cache);

        let mut handles = Vec::new();
        for x in 0..8u32 {
            let cache = std::sync::Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                let a = addr("ds", ResourceKind::Content, 3, x, 0);
                cache.write(&a, vec![x as u8; 64]).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        for x in 0..8u32 {
            let a = addr("ds", ResourceKind::Content, 3, x, 0);
            assert_eq!(cache.read(&a).await.unwrap(), vec![x as u8; 64]);
        }
        assert_eq!(cache.stats().writes, 8);
    }

    #[tokio::test]
    async fn test_open_fails_when_root_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let result = DiskResourceCache::open(&file).await;
        assert!(matches!(result, Err(CacheError::Unavailable(_))));
    }
}
