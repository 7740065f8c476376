//! Integration tests for seeding and on-demand serving.
//!
//! These tests drive the public API end to end:
//! - Full seeding runs through `run_seeding`
//! - Partitioned runs covering the tree exactly once
//! - Cancellation and data source failures
//! - On-demand serving with corrupted and concurrent requests

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use quadseed::cache::{BoxFuture, DiskResourceCache, MemoryResourceCache, ResourceCache};
use quadseed::coord::{BoundingBox, ResourceKind, TileAddress};
use quadseed::dataset::{CollectionConfig, DatasetContext, TilingScheme};
use quadseed::seeding::{run_seeding, SeedingConfig, SeedingEvent, SeedingTimings, WalkerState};
use quadseed::service::TileService;
use quadseed::source::{DataSource, DataSourceError};
use quadseed::subtree::{SubtreeArtifact, MAGIC};
use tempfile::TempDir;
use tokio::runtime::Handle;

// =============================================================================
// Test Helpers
// =============================================================================

type Rule = Box<dyn Fn(&BoundingBox) -> Result<bool, DataSourceError> + Send + Sync>;

/// Data source answering presence queries from a rule and counting calls.
struct StubSource {
    rule: Rule,
    presence_calls: AtomicUsize,
    materialize_calls: AtomicUsize,
}

impl StubSource {
    fn new(rule: impl Fn(&BoundingBox) -> Result<bool, DataSourceError> + Send + Sync + 'static) -> Self {
        Self {
            rule: Box::new(rule),
            presence_calls: AtomicUsize::new(0),
            materialize_calls: AtomicUsize::new(0),
        }
    }

    fn always() -> Self {
        Self::new(|_| Ok(true))
    }

    fn never() -> Self {
        Self::new(|_| Ok(false))
    }

    fn presence_calls(&self) -> usize {
        self.presence_calls.load(Ordering::SeqCst)
    }
}

impl DataSource for StubSource {
    fn presence<'a>(
        &'a self,
        _collection: &'a str,
        bbox: &'a BoundingBox,
        _filter: Option<&'a str>,
    ) -> BoxFuture<'a, Result<bool, DataSourceError>> {
        Box::pin(async move {
            self.presence_calls.fetch_add(1, Ordering::SeqCst);
            (self.rule)(bbox)
        })
    }

    fn materialize<'a>(
        &'a self,
        collection: &'a str,
        bbox: &'a BoundingBox,
        _filter: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<u8>, DataSourceError>> {
        Box::pin(async move {
            self.materialize_calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{}:{}", collection, bbox).into_bytes())
        })
    }

    fn name(&self) -> &str {
        "stub"
    }
}

fn context(max_level: u8, subtree_levels: u8, first_content: u8) -> Arc<DatasetContext> {
    Arc::new(
        DatasetContext::new(
            "ds",
            BoundingBox::new(0.0, 0.0, 64.0, 64.0),
            TilingScheme::new(max_level, subtree_levels, first_content),
        )
        .with_collection(CollectionConfig::new("c")),
    )
}

fn fast_config(partition_count: u32) -> SeedingConfig {
    SeedingConfig {
        partition_count,
        timings: SeedingTimings {
            poll_interval: Duration::from_millis(5),
            max_poll_attempts: 1000,
            purge_grace: Duration::from_millis(5),
        },
        ..SeedingConfig::default()
    }
}

/// Run seeding to completion and group completed subtrees by partition.
async fn seed(
    ctx: Arc<DatasetContext>,
    config: SeedingConfig,
    cache: Arc<dyn ResourceCache>,
    source: Arc<StubSource>,
) -> (
    Vec<quadseed::seeding::SeedingStatus>,
    HashMap<u32, Vec<TileAddress>>,
) {
    let mut handle = run_seeding(ctx, config, cache, source, &Handle::current()).unwrap();
    let mut events = handle.take_events().unwrap();
    let statuses = handle.wait().await;

    let mut completed: HashMap<u32, Vec<TileAddress>> = HashMap::new();
    while let Ok(event) = events.try_recv() {
        if let SeedingEvent::SubtreeCompleted {
            partition, address, ..
        } = event
        {
            completed.entry(partition).or_default().push(address);
        }
    }
    (statuses, completed)
}

// =============================================================================
// Seeding
// =============================================================================

#[tokio::test]
async fn test_always_available_dataset_single_subtree() {
    let ctx = context(2, 2, 1);
    let cache = Arc::new(MemoryResourceCache::new());
    let source = Arc::new(StubSource::always());

    let (statuses, _) = seed(ctx.clone(), fast_config(1), cache.clone(), source.clone()).await;

    assert_eq!(statuses.len(), 1);
    let status = &statuses[0];
    assert_eq!(status.state, WalkerState::Done);
    assert_eq!(status.total, 1);
    assert_eq!(status.processed, 1);
    assert_eq!(status.computed, 1);
    // Level 1 holds the only content cells in the subtree.
    assert_eq!(status.content_written, 4);
    assert_eq!(source.materialize_calls.load(Ordering::SeqCst), 4);

    let root = TileAddress::root("ds", "c");
    let artifact = SubtreeArtifact::from_bytes(&cache.read(&root).await.unwrap()).unwrap();
    assert!(artifact.tile_availability.is_always());
    assert!(artifact.child_subtree_availability.is_always());
    assert!(!artifact.content().is_available(0));
    assert!((1..5).all(|i| artifact.content().is_available(i)));

    // Root subtree plus four content tiles
    assert_eq!(cache.len(), 5);
}

#[tokio::test]
async fn test_empty_dataset_caches_empty_root() {
    let ctx = context(4, 2, 0);
    let cache = Arc::new(MemoryResourceCache::new());
    let source = Arc::new(StubSource::never());

    let (statuses, completed) = seed(ctx, fast_config(1), cache.clone(), source.clone()).await;

    let status = &statuses[0];
    assert_eq!(status.state, WalkerState::Done);
    assert_eq!(status.total, 17);
    assert_eq!(status.processed, 1);
    assert_eq!(status.skipped, 16);
    assert_eq!(status.content_written, 0);
    assert_eq!(source.materialize_calls.load(Ordering::SeqCst), 0);

    let root = TileAddress::root("ds", "c");
    assert_eq!(completed[&0], vec![root.clone()]);
    let artifact = SubtreeArtifact::from_bytes(&cache.read(&root).await.unwrap()).unwrap();
    assert!(artifact.is_empty());
    assert_eq!(cache.keys().len(), 1);
}

#[tokio::test]
async fn test_partitions_cover_every_subtree_exactly_once() {
    let ctx = context(5, 2, 0);

    let single_cache = Arc::new(MemoryResourceCache::new());
    let (_, single) = seed(
        ctx.clone(),
        fast_config(1),
        single_cache,
        Arc::new(StubSource::always()),
    )
    .await;
    let expected: BTreeSet<TileAddress> = single[&0].iter().cloned().collect();
    assert_eq!(expected.len(), 1 + 16 + 256);

    let cache = Arc::new(MemoryResourceCache::new());
    let (statuses, partitioned) = seed(
        ctx.clone(),
        fast_config(4),
        cache,
        Arc::new(StubSource::always()),
    )
    .await;

    let mut seen = BTreeSet::new();
    for addresses in partitioned.values() {
        for addr in addresses.iter().filter(|a| !a.is_root()) {
            assert!(seen.insert(addr.clone()), "{} visited twice", addr);
        }
    }
    let without_root: BTreeSet<TileAddress> =
        expected.into_iter().filter(|a| !a.is_root()).collect();
    assert_eq!(seen, without_root);

    for status in &statuses {
        assert_eq!(status.state, WalkerState::Done);
        assert_eq!(status.processed + status.skipped, status.total);
    }
}

#[tokio::test]
async fn test_partitioned_purge_clears_stale_entries() {
    let ctx = context(5, 2, 0);

    let (_, single) = seed(
        ctx.clone(),
        fast_config(1),
        Arc::new(MemoryResourceCache::new()),
        Arc::new(StubSource::always()),
    )
    .await;
    let expected: BTreeSet<TileAddress> =
        single[&0].iter().filter(|a| !a.is_root()).cloned().collect();

    let cache = Arc::new(MemoryResourceCache::new());
    let stale_subtree = TileAddress::new("ds", "c", ResourceKind::Subtree, 2, 1, 2).unwrap();
    let stale_content = TileAddress::new("ds", "retired", ResourceKind::Content, 3, 1, 1).unwrap();
    let other_dataset = TileAddress::new("other", "c", ResourceKind::Content, 1, 0, 0).unwrap();
    for addr in [&stale_subtree, &stale_content, &other_dataset] {
        cache.write(addr, b"stale".to_vec()).await.unwrap();
    }

    let config = SeedingConfig {
        purge_before_run: true,
        ..fast_config(4)
    };
    let (statuses, partitioned) = seed(
        ctx,
        config,
        cache.clone(),
        Arc::new(StubSource::always()),
    )
    .await;

    for status in &statuses {
        assert_eq!(status.state, WalkerState::Done);
        assert_eq!(status.processed + status.skipped, status.total);
    }

    // Purged, then recomputed from the source.
    assert!(!cache.exists(&stale_content).await.unwrap());
    let rewritten = cache.read(&stale_subtree).await.unwrap();
    assert_ne!(rewritten, b"stale".to_vec());
    assert!(SubtreeArtifact::from_bytes(&rewritten).is_ok());

    // Purge is scoped to the seeded dataset.
    assert!(cache.exists(&other_dataset).await.unwrap());

    let visited: BTreeSet<TileAddress> = partitioned
        .values()
        .flatten()
        .filter(|a| !a.is_root())
        .cloned()
        .collect();
    assert_eq!(visited, expected);
}

#[tokio::test]
async fn test_cancelled_run_stops_every_partial() {
    let ctx = context(8, 2, 0);
    let cache = Arc::new(MemoryResourceCache::new());
    let source = Arc::new(StubSource::always());

    let handle = run_seeding(ctx, fast_config(2), cache.clone(), source, &Handle::current()).unwrap();
    handle.cancel();
    assert!(handle.is_cancelled());

    let statuses = handle.wait().await;
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|s| s.state == WalkerState::Cancelled));
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_data_source_error_skips_branch() {
    let ctx = context(5, 2, 0);
    let cache = Arc::new(MemoryResourceCache::new());
    // Fails for every box smaller than a level-2 cell.
    let source = Arc::new(StubSource::new(|bbox| {
        if bbox.width() < 10.0 {
            Err(DataSourceError::new("backend unavailable"))
        } else {
            Ok(true)
        }
    }));

    let (statuses, _) = seed(ctx, fast_config(1), cache.clone(), source).await;

    let status = &statuses[0];
    assert_eq!(status.state, WalkerState::Done);
    assert!(status.error.is_none());
    assert_eq!(status.total, 273);
    assert_eq!(status.processed, 17);
    assert_eq!(status.failed, 16);
    assert_eq!(status.processed + status.skipped, status.total);
    assert!(!status.messages.is_empty());

    // Failed subtrees are not cached.
    let child = TileAddress::new("ds", "c", ResourceKind::Subtree, 2, 0, 0).unwrap();
    assert!(!cache.exists(&child).await.unwrap());
    assert!(cache.exists(&TileAddress::root("ds", "c")).await.unwrap());
}

#[tokio::test]
async fn test_second_run_is_served_from_disk_cache() {
    let temp = TempDir::new().unwrap();
    let ctx = context(4, 2, 2);
    let cache = Arc::new(DiskResourceCache::open(temp.path()).await.unwrap());

    let first_source = Arc::new(StubSource::always());
    let (first, _) = seed(ctx.clone(), fast_config(1), cache.clone(), first_source).await;
    assert_eq!(first[0].computed, 17);

    let second_source = Arc::new(StubSource::always());
    let (second, _) = seed(ctx, fast_config(1), cache, second_source.clone()).await;
    assert_eq!(second[0].computed, 0);
    assert_eq!(second[0].cache_hits, 17);
    assert_eq!(second[0].content_written, 0);
    assert_eq!(second[0].content_existing, first[0].content_written);
    assert_eq!(second_source.presence_calls(), 0);
}

// =============================================================================
// On-demand serving
// =============================================================================

#[tokio::test]
async fn test_corrupted_root_is_recomputed() {
    let ctx = context(4, 2, 0);
    let cache = Arc::new(MemoryResourceCache::new());
    let source = Arc::new(StubSource::always());
    let service = TileService::new(cache.clone(), source.clone());

    let root = TileAddress::root("ds", "c");
    cache.write(&root, b"bogus".to_vec()).await.unwrap();

    let artifact = service.get_subtree(&ctx, &root).await.unwrap().unwrap();
    assert!(artifact.tile_availability.is_always());
    assert!(source.presence_calls() > 0);

    let stored = cache.read(&root).await.unwrap();
    assert_eq!(&stored[..4], &MAGIC);
}

#[tokio::test]
async fn test_subtree_computed_at_most_once() {
    let ctx = context(4, 2, 0);
    let root = TileAddress::root("ds", "c");

    let reference = Arc::new(StubSource::always());
    TileService::new(Arc::new(MemoryResourceCache::new()), reference.clone())
        .get_subtree(&ctx, &root)
        .await
        .unwrap();
    let single = reference.presence_calls();

    let source = Arc::new(StubSource::always());
    let service = TileService::new(Arc::new(MemoryResourceCache::new()), source.clone());
    let (a, b) = tokio::join!(
        service.get_subtree_bytes(&ctx, &root),
        service.get_subtree_bytes(&ctx, &root)
    );
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(source.presence_calls(), single);

    service.get_subtree(&ctx, &root).await.unwrap();
    assert_eq!(source.presence_calls(), single);
}

#[tokio::test]
async fn test_content_served_after_seeding() {
    let ctx = context(2, 2, 1);
    let cache = Arc::new(MemoryResourceCache::new());
    let source = Arc::new(StubSource::always());
    let service = TileService::new(cache, source);

    let handle = service
        .run_seeding(ctx.clone(), fast_config(1), &Handle::current())
        .unwrap();
    handle.wait().await;

    let content = ctx.address("c", ResourceKind::Content, 1, 1, 0).unwrap();
    let bytes = service.get_content(&ctx, &content).await.unwrap().unwrap();
    assert!(String::from_utf8(bytes).unwrap().starts_with("c:"));

    let root_content = ctx.address("c", ResourceKind::Content, 0, 0, 0).unwrap();
    assert!(service.get_content(&ctx, &root_content).await.unwrap().is_none());
}
