//! Subtree computation.
//!
//! Shared by the seeding walker and on-demand serving:
//!
//! 1. Presence queries for every cell of every level inside the subtree,
//!    Morton-ordered per level, fill tile and content availability.
//! 2. Presence queries for every child subtree root fill child availability.
//! 3. Available content cells are materialized through the data source and
//!    stored under their Content-kind address.
//!
//! A cell whose parent is empty is not queried when both levels use the same
//! tile filter, since a box inside an empty box cannot hold features.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::availability::{Availability, AvailabilityClass, Bitstream};
use crate::cache::{read_optional, ResourceCache};
use crate::coord::{cells_on_level, level_offset, subtree_cell, BoundingBox, ResourceKind, TileAddress};
use crate::dataset::{CollectionConfig, DatasetContext};
use crate::error::TilesError;
use crate::source::DataSource;
use crate::subtree::SubtreeArtifact;

/// Decoded subtree read back from the cache.
#[derive(Debug, Clone)]
pub struct CachedSubtree {
    pub artifact: SubtreeArtifact,
    /// Bytes exactly as stored
    pub bytes: Vec<u8>,
}

/// Tally of one content materialization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentOutcome {
    /// Content cells materialized and stored
    pub written: u64,
    /// Content cells already in the cache
    pub existing: u64,
    /// Content cells whose materialization or write failed
    pub failed: u64,
}

enum ContentResult {
    Written,
    Existing,
    Failed,
    Cancelled,
}

/// Computes subtree artifacts and their content from a data source.
pub struct SubtreeComputer {
    cache: Arc<dyn ResourceCache>,
    source: Arc<dyn DataSource>,
    content_concurrency: usize,
}

impl SubtreeComputer {
    pub fn new(
        cache: Arc<dyn ResourceCache>,
        source: Arc<dyn DataSource>,
        content_concurrency: usize,
    ) -> Self {
        Self {
            cache,
            source,
            content_concurrency: content_concurrency.max(1),
        }
    }

    pub fn cache(&self) -> &Arc<dyn ResourceCache> {
        &self.cache
    }

    /// Read and decode a cached subtree.
    ///
    /// Zero-length entries, undecodable bytes, artifacts built for another
    /// subtree depth and read failures all count as a miss.
    pub async fn load_cached(
        &self,
        addr: &TileAddress,
        subtree_levels: u8,
    ) -> Option<CachedSubtree> {
        let bytes = match read_optional(self.cache.as_ref(), addr).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(addr = %addr, error = %e, "Failed to read cached subtree, treating as miss");
                return None;
            }
        };

        if bytes.is_empty() {
            debug!(addr = %addr, "Zero-length cached subtree, treating as miss");
            return None;
        }

        match SubtreeArtifact::from_bytes(&bytes) {
            Ok(artifact) if artifact.subtree_levels == subtree_levels => {
                Some(CachedSubtree { artifact, bytes })
            }
            Ok(artifact) => {
                warn!(
                    addr = %addr,
                    cached_levels = artifact.subtree_levels,
                    subtree_levels,
                    "Cached subtree has a different depth, recomputing"
                );
                None
            }
            Err(e) => {
                warn!(addr = %addr, error = %e, "Cached subtree is malformed, recomputing");
                None
            }
        }
    }

    /// Encode and store an artifact, returning the stored bytes.
    pub async fn store(
        &self,
        addr: &TileAddress,
        artifact: &SubtreeArtifact,
    ) -> Result<Vec<u8>, TilesError> {
        let bytes = artifact.to_bytes()?;
        self.cache.write(addr, bytes.clone()).await?;
        Ok(bytes)
    }

    /// Compute the availability of the subtree rooted at `addr`.
    ///
    /// Fails with [`TilesError::Cancelled`] when `cancel` fires before a
    /// presence query, or [`TilesError::DataSource`] when a query fails.
    pub async fn compute(
        &self,
        ctx: &DatasetContext,
        addr: &TileAddress,
        cancel: &CancellationToken,
    ) -> Result<SubtreeArtifact, TilesError> {
        let collection = ctx
            .collection(&addr.collection)
            .ok_or(TilesError::InvalidAddress {
                level: addr.level,
                x: addr.x,
                y: addr.y,
            })?;
        let tiling = ctx.tiling;
        let depth = tiling.subtree_levels;
        if depth == 0 {
            return Err(TilesError::MalformedArtifact(
                "subtree must describe at least one level".to_string(),
            ));
        }
        let levels = tiling.levels_in_subtree(addr.level);

        let cells = AvailabilityClass::Tile.cell_count(depth);
        let mut tile_bits = Bitstream::zeroed(cells);
        let mut content_bits = Bitstream::zeroed(cells);

        for rel in 0..levels {
            let level = addr.level + rel;
            let tile_filter = collection.tile_filter_for(level);
            let content_filter = collection.content_filter_for(level);
            let prune = rel > 0 && collection.tile_filter_for(level - 1) == tile_filter;

            for m in 0..cells_on_level(rel) {
                if prune && !tile_bits.get(level_offset(rel - 1) + (m >> 2)) {
                    continue;
                }
                let bbox = addr.descendant(rel, m).bounding_box(&ctx.bounding_box);
                if !self.presence(collection, &bbox, tile_filter, cancel).await? {
                    continue;
                }

                let index = level_offset(rel) + m;
                tile_bits.set(index);

                if tiling.has_content(level) {
                    let has_content = content_filter == tile_filter
                        || self.presence(collection, &bbox, content_filter, cancel).await?;
                    if has_content {
                        content_bits.set(index);
                    }
                }
            }
        }

        let child_availability = if tiling.children_beyond_max(addr.level) {
            Availability::Never
        } else {
            let child_cells = AvailabilityClass::ChildSubtree.cell_count(depth);
            let child_level = addr.level + depth;
            let filter = collection.tile_filter_for(child_level);
            let prune = collection.tile_filter_for(child_level - 1) == filter;
            let last = level_offset(depth - 1);

            let mut bits = Bitstream::zeroed(child_cells);
            for m in 0..child_cells {
                if prune && !tile_bits.get(last + (m >> 2)) {
                    continue;
                }
                let bbox = addr.descendant(depth, m).bounding_box(&ctx.bounding_box);
                if self.presence(collection, &bbox, filter, cancel).await? {
                    bits.set(m);
                }
            }
            Availability::from_bitstream(bits, child_cells)
        };

        let artifact = SubtreeArtifact::new(
            depth,
            Availability::from_bitstream(tile_bits, cells),
            Availability::from_bitstream(content_bits, cells),
            child_availability,
        )?;

        debug!(
            addr = %addr,
            tiles = artifact.tile_availability.available_count(cells),
            content = artifact.content().available_count(cells),
            "Subtree computed"
        );
        Ok(artifact)
    }

    async fn presence(
        &self,
        collection: &CollectionConfig,
        bbox: &BoundingBox,
        filter: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<bool, TilesError> {
        if cancel.is_cancelled() {
            return Err(TilesError::Cancelled);
        }
        Ok(self.source.presence(&collection.id, bbox, filter).await?)
    }

    /// Materialize every available content cell of a subtree that is not
    /// cached yet.
    pub async fn materialize_content(
        &self,
        ctx: &DatasetContext,
        addr: &TileAddress,
        artifact: &SubtreeArtifact,
        cancel: &CancellationToken,
    ) -> ContentOutcome {
        let mut outcome = ContentOutcome::default();
        let Some(collection) = ctx.collection(&addr.collection) else {
            return outcome;
        };

        let cells = AvailabilityClass::Content.cell_count(artifact.subtree_levels);
        let levels = ctx.tiling.levels_in_subtree(addr.level);
        let targets: Vec<TileAddress> = artifact
            .content()
            .available_indices(cells)
            .map(subtree_cell)
            .filter(|&(rel, _)| rel < levels)
            .map(|(rel, m)| addr.descendant(rel, m).with_kind(ResourceKind::Content))
            .filter(|cell| ctx.tiling.has_content(cell.level))
            .collect();

        if targets.is_empty() {
            return outcome;
        }

        let results: Vec<ContentResult> = stream::iter(targets)
            .map(|cell| async move { self.materialize_one(ctx, collection, cell, cancel).await })
            .buffer_unordered(self.content_concurrency)
            .collect()
            .await;

        for result in results {
            match result {
                ContentResult::Written => outcome.written += 1,
                ContentResult::Existing => outcome.existing += 1,
                ContentResult::Failed => outcome.failed += 1,
                ContentResult::Cancelled => {}
            }
        }

        debug!(
            addr = %addr,
            written = outcome.written,
            existing = outcome.existing,
            failed = outcome.failed,
            "Subtree content materialized"
        );
        outcome
    }

    async fn materialize_one(
        &self,
        ctx: &DatasetContext,
        collection: &CollectionConfig,
        cell: TileAddress,
        cancel: &CancellationToken,
    ) -> ContentResult {
        if cancel.is_cancelled() {
            return ContentResult::Cancelled;
        }

        match self.cache.exists(&cell).await {
            Ok(true) => return ContentResult::Existing,
            Ok(false) => {}
            Err(e) => debug!(addr = %cell, error = %e, "Content existence check failed"),
        }

        let bbox = cell.bounding_box(&ctx.bounding_box);
        let filter = collection.content_filter_for(cell.level);
        let bytes = match self.source.materialize(&collection.id, &bbox, filter).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(addr = %cell, error = %e, "Content materialization failed");
                return ContentResult::Failed;
            }
        };

        match self.cache.write(&cell, bytes).await {
            Ok(()) => ContentResult::Written,
            Err(e) => {
                warn!(addr = %cell, error = %e, "Failed to store content");
                ContentResult::Failed
            }
        }
    }
}
