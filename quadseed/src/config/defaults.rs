//! Default values for every configuration setting.

use std::path::PathBuf;

use super::settings::{
    CacheSettings, ConfigFile, DatasetSettings, LoggingSettings, SeedingSettings, TilingSettings,
};
use crate::coord::BoundingBox;

/// Default dataset identifier.
pub const DEFAULT_DATASET_ID: &str = "default";

/// Default deepest level.
pub const DEFAULT_MAX_LEVEL: u8 = 10;

/// Default levels per subtree artifact.
pub const DEFAULT_SUBTREE_LEVELS: u8 = 3;

/// Largest accepted subtree depth (65536 child bits per artifact).
pub const MAX_SUBTREE_LEVELS: u8 = 8;

/// Default shallowest content level.
pub const DEFAULT_FIRST_LEVEL_WITH_CONTENT: u8 = 0;

/// Default number of seeding partials.
pub const DEFAULT_PARTITIONS: u32 = 1;

/// Default interval between root polls (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Default number of root polls.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 300;

/// Default wait for the first partial's purge (milliseconds).
pub const DEFAULT_PURGE_GRACE_MS: u64 = 2_000;

/// Default concurrent content materializations.
pub const DEFAULT_CONTENT_CONCURRENCY: usize = 16;

/// Default cache directory: `<platform cache dir>/quadseed`.
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quadseed")
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            cache: CacheSettings {
                directory: default_cache_directory(),
            },
            dataset: DatasetSettings {
                id: DEFAULT_DATASET_ID.to_string(),
                bbox: BoundingBox::world(),
            },
            tiling: TilingSettings {
                max_level: DEFAULT_MAX_LEVEL,
                subtree_levels: DEFAULT_SUBTREE_LEVELS,
                first_level_with_content: DEFAULT_FIRST_LEVEL_WITH_CONTENT,
            },
            seeding: SeedingSettings {
                partitions: DEFAULT_PARTITIONS,
                purge: false,
                force: false,
                poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
                max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
                purge_grace_ms: DEFAULT_PURGE_GRACE_MS,
                content_concurrency: DEFAULT_CONTENT_CONCURRENCY,
            },
            logging: LoggingSettings {
                file: super::file::config_directory().join("quadseed.log"),
            },
            collections: Vec::new(),
        }
    }
}
