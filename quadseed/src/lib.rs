//! quadseed - Tile quadtree seeding and availability cache
//!
//! This library computes, caches, and serves the availability of a
//! quadtree-tiled geospatial dataset: which cells at which levels hold
//! features, which carry tile content, and which child subtrees exist.
//!
//! # High-Level API
//!
//! For most use cases, the [`service`] module provides a simplified facade:
//!
//! ```ignore
//! use std::sync::Arc;
//! use quadseed::cache::DiskResourceCache;
//! use quadseed::config::ConfigFile;
//! use quadseed::service::TileService;
//! use quadseed::source::PointFeatureSource;
//!
//! let config = ConfigFile::load()?;
//! let ctx = config.to_dataset_context();
//! let cache = Arc::new(DiskResourceCache::open(&config.cache.directory).await?);
//! let service = TileService::new(cache, Arc::new(PointFeatureSource::default()));
//!
//! let subtree = service.get_subtree(&ctx, &ctx.roots()[0]).await?;
//! ```

pub mod availability;
pub mod cache;
pub mod config;
pub mod coord;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod seeding;
pub mod service;
pub mod source;
pub mod subtree;

/// Version of the quadseed library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
