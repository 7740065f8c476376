//! Multi-partial seeding runner.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::ResourceCache;
use crate::dataset::DatasetContext;
use crate::error::TilesError;
use crate::seeding::compute::SubtreeComputer;
use crate::seeding::config::SeedingConfig;
use crate::seeding::status::{SeedingHandle, EVENT_BUFFER};
use crate::seeding::walker::SeedingWalker;
use crate::source::DataSource;

/// Start seeding a dataset and return a handle to the run.
///
/// Spawns one walker task per partial this process runs: every partial when
/// `config.partition_index` is `None`, otherwise only the given one. The
/// partials share nothing but the cache.
///
/// # Errors
///
/// Returns [`TilesError::InvalidConfig`] if the tiling scheme or the
/// partition settings are unusable.
pub fn run_seeding(
    ctx: Arc<DatasetContext>,
    config: SeedingConfig,
    cache: Arc<dyn ResourceCache>,
    source: Arc<dyn DataSource>,
    runtime: &Handle,
) -> Result<SeedingHandle, TilesError> {
    ctx.tiling.validate().map_err(TilesError::InvalidConfig)?;
    config.validate().map_err(TilesError::InvalidConfig)?;

    let cancellation = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let computer = Arc::new(SubtreeComputer::new(
        cache,
        source,
        config.content_concurrency,
    ));

    let partitions = config.partitions_to_run();
    info!(
        dataset = %ctx.id,
        collections = ctx.collections.len(),
        partitions = ?partitions,
        partition_count = config.partition_count,
        "Starting seeding run"
    );

    let mut statuses = Vec::with_capacity(partitions.len());
    let mut tasks = Vec::with_capacity(partitions.len());
    for partition in partitions {
        let walker = SeedingWalker::new(
            Arc::clone(&ctx),
            config.clone(),
            partition,
            Arc::clone(&computer),
            events_tx.clone(),
            cancellation.child_token(),
        );
        statuses.push(walker.status());
        tasks.push(runtime.spawn(async move {
            walker.run().await;
        }));
    }

    Ok(SeedingHandle::new(statuses, cancellation, events_rx, tasks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryResourceCache;
    use crate::coord::BoundingBox;
    use crate::dataset::{CollectionConfig, TilingScheme};
    use crate::seeding::status::SeedingEvent;
    use crate::source::{PointFeature, PointFeatureSource};

    /// One point in every cell of a 32x32 grid over 0..64.
    fn dense_grid() -> PointFeatureSource {
        PointFeatureSource::new((0..32 * 32).map(|i| PointFeature {
            collection: "c".to_string(),
            lon: (i % 32) as f64 * 2.0 + 1.0,
            lat: (i / 32) as f64 * 2.0 + 1.0,
            category: None,
        }))
    }

    #[tokio::test]
    async fn test_unread_events_stay_bounded() {
        let ctx = Arc::new(
            DatasetContext::new(
                "ds",
                BoundingBox::new(0.0, 0.0, 64.0, 64.0),
                TilingScheme::new(6, 1, 6),
            )
            .with_collection(CollectionConfig::new("c")),
        );

        let mut handle = run_seeding(
            ctx,
            SeedingConfig::default(),
            Arc::new(MemoryResourceCache::new()),
            Arc::new(dense_grid()),
            &Handle::current(),
        )
        .unwrap();

        // Nobody reads the stream while the run completes.
        let mut events = handle.take_events().unwrap();
        let statuses = handle.wait().await;
        assert!(statuses[0].processed as usize > EVENT_BUFFER);

        let mut buffered = 0;
        let mut completed = 0;
        while let Ok(event) = events.try_recv() {
            buffered += 1;
            if matches!(event, SeedingEvent::SubtreeCompleted { .. }) {
                completed += 1;
            }
        }
        assert!(buffered <= EVENT_BUFFER);
        assert!(completed > 0);
    }
}
