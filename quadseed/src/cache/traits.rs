//! Resource cache trait definition for dependency injection.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::cache::CacheStats;
use crate::coord::TileAddress;

/// Boxed future used to keep [`ResourceCache`] object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Resource cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// No resource is stored under the address
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// I/O error while reading or writing one resource
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Address component cannot be mapped to a storage key
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// The backing store itself cannot be used
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),
}

impl CacheError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

/// Content-addressable persistent store from [`TileAddress`] to raw bytes.
///
/// Implementations must be safe to call concurrently on disjoint addresses,
/// and a write must never be observable half-done by a concurrent reader.
///
/// # Example
///
/// ```
/// use quadseed::cache::{MemoryResourceCache, ResourceCache};
/// use quadseed::coord::TileAddress;
///
/// # tokio_test_block(async {
/// let cache = MemoryResourceCache::new();
/// let addr = TileAddress::root("ds", "buildings");
///
/// assert!(!cache.exists(&addr).await.unwrap());
/// cache.write(&addr, vec![1, 2, 3]).await.unwrap();
/// assert_eq!(cache.read(&addr).await.unwrap(), vec![1, 2, 3]);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub trait ResourceCache: Send + Sync {
    /// Check whether a resource is stored under `addr`.
    fn exists<'a>(&'a self, addr: &'a TileAddress) -> BoxFuture<'a, Result<bool, CacheError>>;

    /// Read the resource stored under `addr`.
    ///
    /// Returns [`CacheError::NotFound`] if nothing is stored.
    fn read<'a>(&'a self, addr: &'a TileAddress) -> BoxFuture<'a, Result<Vec<u8>, CacheError>>;

    /// Store `data` under `addr`, replacing any previous value wholesale.
    fn write<'a>(
        &'a self,
        addr: &'a TileAddress,
        data: Vec<u8>,
    ) -> BoxFuture<'a, Result<(), CacheError>>;

    /// Remove the resource under `addr`. Returns whether anything was removed.
    fn delete<'a>(&'a self, addr: &'a TileAddress) -> BoxFuture<'a, Result<bool, CacheError>>;

    /// Remove every resource of a dataset. Returns the number removed.
    fn delete_all<'a>(&'a self, dataset: &'a str) -> BoxFuture<'a, Result<u64, CacheError>>;

    /// Activity counters since the cache was opened.
    fn stats(&self) -> CacheStats;
}

/// Read a resource, mapping "not found" to `None`.
pub async fn read_optional(
    cache: &dyn ResourceCache,
    addr: &TileAddress,
) -> Result<Option<Vec<u8>>, CacheError> {
    match cache.read(addr).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
