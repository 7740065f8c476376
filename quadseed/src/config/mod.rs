//! Configuration file support.
//!
//! The engine itself never reads files: [`ConfigFile`] is loaded from an INI
//! file and resolved into the [`DatasetContext`](crate::dataset::DatasetContext)
//! and [`SeedingConfig`](crate::seeding::SeedingConfig) the engine consumes.
//!
//! # Example
//!
//! ```
//! use quadseed::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! let ctx = config.to_dataset_context();
//! let seeding = config.to_seeding_config();
//!
//! assert_eq!(ctx.tiling.subtree_levels, 3);
//! assert_eq!(seeding.partition_count, 1);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    CacheSettings, CollectionSettings, ConfigFile, DatasetSettings, LoggingSettings,
    SeedingSettings, TilingSettings,
};
