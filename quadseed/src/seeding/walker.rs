//! Breadth-first seeding walker.
//!
//! One walker runs one partial. It walks subtree roots through an explicit
//! queue, so a subtree is always cached before any of its children is
//! visited, and checks the cancellation token between pops.
//!
//! ```text
//! Idle ──> Purging ──> Walking ──> Done
//!   │                     │
//!   └─────────────────────┴──────> Cancelled
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::coord::TileAddress;
use crate::dataset::DatasetContext;
use crate::error::TilesError;
use crate::seeding::compute::SubtreeComputer;
use crate::seeding::config::SeedingConfig;
use crate::seeding::partition::is_owned;
use crate::seeding::status::{SeedingEvent, SeedingStatus, WalkerState};
use crate::subtree::SubtreeArtifact;

/// Walker for one seeding partial.
pub struct SeedingWalker {
    ctx: Arc<DatasetContext>,
    config: SeedingConfig,
    partition: u32,
    computer: Arc<SubtreeComputer>,
    status: Arc<Mutex<SeedingStatus>>,
    events: mpsc::Sender<SeedingEvent>,
    cancellation: CancellationToken,
}

impl SeedingWalker {
    pub fn new(
        ctx: Arc<DatasetContext>,
        config: SeedingConfig,
        partition: u32,
        computer: Arc<SubtreeComputer>,
        events: mpsc::Sender<SeedingEvent>,
        cancellation: CancellationToken,
    ) -> Self {
        let status = Arc::new(Mutex::new(SeedingStatus::new(ctx.id.clone(), partition)));
        Self {
            ctx,
            config,
            partition,
            computer,
            status,
            events,
            cancellation,
        }
    }

    /// Shared status updated while the walker runs.
    pub fn status(&self) -> Arc<Mutex<SeedingStatus>> {
        Arc::clone(&self.status)
    }

    /// Run the partial to completion and return its final status.
    pub async fn run(self) -> SeedingStatus {
        info!(
            dataset = %self.ctx.id,
            partition = self.partition,
            partitions = self.config.partition_count,
            "Seeding partial started"
        );

        match self.walk().await {
            Ok(()) => self.finish(WalkerState::Done, None),
            Err(TilesError::Cancelled) => self.finish(WalkerState::Cancelled, None),
            Err(e) => {
                error!(
                    dataset = %self.ctx.id,
                    partition = self.partition,
                    error = %e,
                    "Seeding partial failed"
                );
                self.finish(WalkerState::Done, Some(e.to_string()))
            }
        }
    }

    fn is_first(&self) -> bool {
        self.partition == 0
    }

    async fn walk(&self) -> Result<(), TilesError> {
        self.prepare().await?;
        self.set_state(WalkerState::Walking);

        let per_collection = self.ctx.tiling.subtree_count_below(0);
        self.status.lock().total = per_collection * self.ctx.collections.len() as u64;

        let mut queue = VecDeque::new();
        for root in self.ctx.roots() {
            self.check_cancelled()?;
            if self.is_first() {
                self.visit(&root, &mut queue).await?;
            } else {
                match self.poll_root(&root).await? {
                    Some(artifact) => self.expand(&root, artifact, true, &mut queue).await?,
                    None => self.status.lock().skipped += per_collection,
                }
            }
        }

        while let Some(addr) = queue.pop_front() {
            self.check_cancelled()?;
            self.visit(&addr, &mut queue).await?;
        }
        Ok(())
    }

    /// Purge the dataset (first partial) or give the first partial time to
    /// purge (other partials).
    async fn prepare(&self) -> Result<(), TilesError> {
        if !self.config.purge_before_run {
            return Ok(());
        }
        self.set_state(WalkerState::Purging);

        if self.is_first() {
            let removed = self
                .computer
                .cache()
                .delete_all(&self.ctx.id)
                .await
                .map_err(|e| TilesError::CacheUnavailable(e.to_string()))?;
            info!(dataset = %self.ctx.id, removed, "Dataset purged before seeding");
            Ok(())
        } else {
            self.sleep(self.config.timings.purge_grace).await
        }
    }

    /// Wait for the first partial to cache a root subtree.
    async fn poll_root(&self, root: &TileAddress) -> Result<Option<SubtreeArtifact>, TilesError> {
        let timings = self.config.timings;
        for attempt in 0..timings.max_poll_attempts {
            self.check_cancelled()?;
            if let Some(cached) = self
                .computer
                .load_cached(root, self.ctx.tiling.subtree_levels)
                .await
            {
                debug!(addr = %root, attempt, "Root subtree available");
                return Ok(Some(cached.artifact));
            }
            self.sleep(timings.poll_interval).await?;
        }

        self.warning(format!(
            "root subtree {} not available after {} polls, skipping collection",
            root, timings.max_poll_attempts
        ));
        Ok(None)
    }

    /// Load or compute one subtree, then expand it.
    ///
    /// Only cancellation and fatal cache errors are returned; anything else
    /// skips the branch.
    async fn visit(
        &self,
        addr: &TileAddress,
        queue: &mut VecDeque<TileAddress>,
    ) -> Result<(), TilesError> {
        match self.obtain(addr).await {
            Ok((artifact, from_cache)) => self.expand(addr, artifact, from_cache, queue).await,
            Err(e) if matches!(e, TilesError::Cancelled) || e.is_fatal() => Err(e),
            Err(e) => {
                let below = self.ctx.tiling.subtree_count_below(addr.level) - 1;
                {
                    let mut s = self.status.lock();
                    s.processed += 1;
                    s.failed += 1;
                    s.skipped += below;
                }
                self.warning(format!("subtree {} skipped: {}", addr, e));
                Ok(())
            }
        }
    }

    async fn obtain(&self, addr: &TileAddress) -> Result<(SubtreeArtifact, bool), TilesError> {
        if !self.config.force_recompute {
            if let Some(cached) = self
                .computer
                .load_cached(addr, self.ctx.tiling.subtree_levels)
                .await
            {
                return Ok((cached.artifact, true));
            }
        }

        let artifact = self
            .computer
            .compute(&self.ctx, addr, &self.cancellation)
            .await?;
        if let Err(e) = self.computer.store(addr, &artifact).await {
            self.warning(format!("failed to cache subtree {}: {}", addr, e));
        }
        Ok((artifact, false))
    }

    /// Record a visited subtree, materialize its content and queue its children.
    async fn expand(
        &self,
        addr: &TileAddress,
        artifact: SubtreeArtifact,
        from_cache: bool,
        queue: &mut VecDeque<TileAddress>,
    ) -> Result<(), TilesError> {
        {
            let mut s = self.status.lock();
            s.processed += 1;
            if from_cache {
                s.cache_hits += 1;
            } else {
                s.computed += 1;
            }
        }
        self.emit(SeedingEvent::SubtreeCompleted {
            partition: self.partition,
            address: addr.clone(),
            from_cache,
        });

        // The shared root's content belongs to the first partial.
        if !addr.is_root() || self.is_first() {
            let outcome = self
                .computer
                .materialize_content(&self.ctx, addr, &artifact, &self.cancellation)
                .await;
            let mut s = self.status.lock();
            s.content_written += outcome.written;
            s.content_existing += outcome.existing;
            s.content_failed += outcome.failed;
        }
        self.check_cancelled()?;

        self.enqueue_children(addr, &artifact, queue);
        Ok(())
    }

    fn enqueue_children(
        &self,
        addr: &TileAddress,
        artifact: &SubtreeArtifact,
        queue: &mut VecDeque<TileAddress>,
    ) {
        let tiling = self.ctx.tiling;
        let depth = tiling.subtree_levels;
        if tiling.children_beyond_max(addr.level) {
            return;
        }
        // Subtrees rooted on the max level are served on demand.
        let child_level = addr.level + depth;
        if child_level >= tiling.max_level {
            return;
        }

        let per_child = tiling.subtree_count_below(child_level);
        let availability = &artifact.child_subtree_availability;
        let mut skipped = 0u64;
        let mut enqueued = 0usize;

        for (index, child) in addr.children(depth).into_iter().enumerate() {
            let owned = is_owned(&child, depth, self.config.partition_count, self.partition);
            if availability.is_available(index as u64) && owned {
                queue.push_back(child);
                enqueued += 1;
            } else {
                skipped += per_child;
            }
        }

        self.status.lock().skipped += skipped;
        debug!(addr = %addr, enqueued, skipped, "Children queued");
    }

    fn check_cancelled(&self) -> Result<(), TilesError> {
        if self.cancellation.is_cancelled() {
            Err(TilesError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn sleep(&self, duration: Duration) -> Result<(), TilesError> {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(TilesError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Deliver an event without waiting; dropped when the buffer is full.
    fn emit(&self, event: SeedingEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.events.try_send(event) {
            trace!(partition = self.partition, "Event buffer full, event dropped");
        }
    }

    fn set_state(&self, state: WalkerState) {
        self.status.lock().state = state;
        self.emit(SeedingEvent::StateChanged {
            partition: self.partition,
            state,
        });
    }

    fn warning(&self, message: String) {
        warn!(dataset = %self.ctx.id, partition = self.partition, "{}", message);
        self.status.lock().push_message(message.clone());
        self.emit(SeedingEvent::Warning {
            partition: self.partition,
            message,
        });
    }

    fn finish(&self, state: WalkerState, error: Option<String>) -> SeedingStatus {
        let snapshot = {
            let mut s = self.status.lock();
            s.state = state;
            s.error = error;
            s.clone()
        };

        if state == WalkerState::Cancelled {
            info!(
                dataset = %snapshot.dataset,
                partition = snapshot.partition,
                processed = snapshot.processed,
                "Seeding partial cancelled"
            );
        } else {
            info!(
                dataset = %snapshot.dataset,
                partition = snapshot.partition,
                processed = snapshot.processed,
                computed = snapshot.computed,
                cache_hits = snapshot.cache_hits,
                skipped = snapshot.skipped,
                failed = snapshot.failed,
                content_written = snapshot.content_written,
                "Seeding partial finished"
            );
        }

        self.emit(SeedingEvent::StateChanged {
            partition: self.partition,
            state,
        });
        self.emit(SeedingEvent::Finished(snapshot.clone()));
        snapshot
    }
}
