//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing logic.

use std::path::PathBuf;
use std::time::Duration;

use crate::coord::BoundingBox;
use crate::dataset::{CollectionConfig, DatasetContext, LevelFilter, TilingScheme};
use crate::seeding::{SeedingConfig, SeedingTimings};

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub cache: CacheSettings,
    pub dataset: DatasetSettings,
    pub tiling: TilingSettings,
    pub seeding: SeedingSettings,
    pub logging: LoggingSettings,
    /// One entry per `[collection.<id>]` section, in file order
    pub collections: Vec<CollectionSettings>,
}

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Cache root directory
    pub directory: PathBuf,
}

/// Dataset identity and extent.
#[derive(Debug, Clone)]
pub struct DatasetSettings {
    pub id: String,
    /// Root bounding box, sliced into the quadtree grid
    pub bbox: BoundingBox,
}

/// Quadtree depth settings.
#[derive(Debug, Clone, Copy)]
pub struct TilingSettings {
    pub max_level: u8,
    pub subtree_levels: u8,
    pub first_level_with_content: u8,
}

/// Seeding run settings.
#[derive(Debug, Clone)]
pub struct SeedingSettings {
    pub partitions: u32,
    pub purge: bool,
    pub force: bool,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub purge_grace_ms: u64,
    pub content_concurrency: usize,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    /// Log file path
    pub file: PathBuf,
}

/// One enabled collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSettings {
    pub id: String,
    pub tile_filters: Vec<LevelFilter>,
    pub content_filters: Vec<LevelFilter>,
}

impl ConfigFile {
    /// Resolve the dataset settings into the context passed to the engine.
    pub fn to_dataset_context(&self) -> DatasetContext {
        let tiling = TilingScheme::new(
            self.tiling.max_level,
            self.tiling.subtree_levels,
            self.tiling.first_level_with_content,
        );
        self.collections.iter().fold(
            DatasetContext::new(self.dataset.id.clone(), self.dataset.bbox, tiling),
            |ctx, c| {
                ctx.with_collection(CollectionConfig {
                    id: c.id.clone(),
                    tile_filters: c.tile_filters.clone(),
                    content_filters: c.content_filters.clone(),
                })
            },
        )
    }

    /// Resolve the seeding settings. Runs every partial unless the caller
    /// sets `partition_index`.
    pub fn to_seeding_config(&self) -> SeedingConfig {
        SeedingConfig {
            partition_count: self.seeding.partitions,
            partition_index: None,
            purge_before_run: self.seeding.purge,
            force_recompute: self.seeding.force,
            timings: SeedingTimings {
                poll_interval: Duration::from_millis(self.seeding.poll_interval_ms),
                max_poll_attempts: self.seeding.max_poll_attempts,
                purge_grace: Duration::from_millis(self.seeding.purge_grace_ms),
            },
            content_concurrency: self.seeding.content_concurrency,
        }
    }
}
