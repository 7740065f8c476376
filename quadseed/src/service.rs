//! On-demand tile service.
//!
//! Entry point for the request-handling layer. Cached resources are returned
//! verbatim; an uncached subtree is computed once, stored together with its
//! content, and returned. Content is never computed on its own.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{read_optional, ResourceCache};
use crate::coord::{ResourceKind, TileAddress};
use crate::dataset::DatasetContext;
use crate::error::TilesError;
use crate::seeding::{run_seeding, SeedingConfig, SeedingHandle, SubtreeComputer, DEFAULT_CONTENT_CONCURRENCY};
use crate::source::DataSource;
use crate::subtree::SubtreeArtifact;

/// Serves subtrees and content for any number of datasets.
pub struct TileService {
    cache: Arc<dyn ResourceCache>,
    source: Arc<dyn DataSource>,
    computer: SubtreeComputer,
    /// One lock per subtree being computed on demand
    in_flight: DashMap<TileAddress, Arc<tokio::sync::Mutex<()>>>,
}

impl TileService {
    pub fn new(cache: Arc<dyn ResourceCache>, source: Arc<dyn DataSource>) -> Self {
        let computer = SubtreeComputer::new(
            Arc::clone(&cache),
            Arc::clone(&source),
            DEFAULT_CONTENT_CONCURRENCY,
        );
        Self {
            cache,
            source,
            computer,
            in_flight: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &Arc<dyn ResourceCache> {
        &self.cache
    }

    /// Encoded subtree for `addr`, computing and caching it when needed.
    ///
    /// Returns `Ok(None)` when the subtree could not be computed; the failure
    /// is not cached, so a later request retries.
    pub async fn get_subtree_bytes(
        &self,
        ctx: &DatasetContext,
        addr: &TileAddress,
    ) -> Result<Option<Vec<u8>>, TilesError> {
        check_kind(addr, ResourceKind::Subtree)?;
        ctx.check_address(addr)?;

        let levels = ctx.tiling.subtree_levels;
        if let Some(cached) = self.computer.load_cached(addr, levels).await {
            return Ok(Some(cached.bytes));
        }

        let lock = self.in_flight.entry(addr.clone()).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            match self.computer.load_cached(addr, levels).await {
                Some(cached) => Ok(Some(cached.bytes)),
                None => self.compute_and_store(ctx, addr).await,
            }
        };

        // Drop the entry once nobody else holds the lock.
        self.in_flight
            .remove_if(addr, |_, entry| Arc::strong_count(entry) <= 2);
        result
    }

    /// Decoded subtree for `addr`.
    pub async fn get_subtree(
        &self,
        ctx: &DatasetContext,
        addr: &TileAddress,
    ) -> Result<Option<SubtreeArtifact>, TilesError> {
        match self.get_subtree_bytes(ctx, addr).await? {
            Some(bytes) => SubtreeArtifact::from_bytes(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Cached content bytes for `addr`, or `None` if its subtree has not
    /// produced it.
    ///
    /// Seeding never enqueues subtrees rooted at `max_level`, so content on
    /// that level only appears once its subtree has been served on demand.
    pub async fn get_content(
        &self,
        ctx: &DatasetContext,
        addr: &TileAddress,
    ) -> Result<Option<Vec<u8>>, TilesError> {
        check_kind(addr, ResourceKind::Content)?;
        ctx.check_address(addr)?;

        let content = read_optional(self.cache.as_ref(), addr).await?;
        if content.is_none() {
            debug!(addr = %addr, "Content not cached");
        }
        Ok(content)
    }

    /// Start seeding `ctx` with this service's cache and data source.
    pub fn run_seeding(
        &self,
        ctx: Arc<DatasetContext>,
        config: SeedingConfig,
        runtime: &Handle,
    ) -> Result<SeedingHandle, TilesError> {
        run_seeding(
            ctx,
            config,
            Arc::clone(&self.cache),
            Arc::clone(&self.source),
            runtime,
        )
    }

    /// Delete every cached resource of a dataset.
    pub async fn purge(&self, ctx: &DatasetContext) -> Result<u64, TilesError> {
        let removed = self.cache.delete_all(&ctx.id).await?;
        info!(dataset = %ctx.id, removed, "Dataset purged");
        Ok(removed)
    }

    async fn compute_and_store(
        &self,
        ctx: &DatasetContext,
        addr: &TileAddress,
    ) -> Result<Option<Vec<u8>>, TilesError> {
        let cancel = CancellationToken::new();
        let artifact = match self.computer.compute(ctx, addr, &cancel).await {
            Ok(artifact) => artifact,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(addr = %addr, error = %e, "On-demand subtree computation failed");
                return Ok(None);
            }
        };

        let bytes = self.computer.store(addr, &artifact).await?;
        let outcome = self
            .computer
            .materialize_content(ctx, addr, &artifact, &cancel)
            .await;

        info!(
            addr = %addr,
            content_written = outcome.written,
            content_failed = outcome.failed,
            "Subtree computed on demand"
        );
        Ok(Some(bytes))
    }
}

fn check_kind(addr: &TileAddress, kind: ResourceKind) -> Result<(), TilesError> {
    if addr.kind == kind {
        Ok(())
    } else {
        Err(TilesError::InvalidAddress {
            level: addr.level,
            x: addr.x,
            y: addr.y,
        })
    }
}
