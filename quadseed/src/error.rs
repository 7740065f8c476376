//! Error kinds shared across the tile engine.
//!
//! Local failures (one cell, one subtree) are reported through these kinds
//! and handled by the caller; only [`TilesError::CacheUnavailable`] is
//! treated as fatal for a seeding partial.

use thiserror::Error;

use crate::cache::CacheError;
use crate::source::DataSourceError;

/// Errors produced by the tile engine.
#[derive(Debug, Error)]
pub enum TilesError {
    /// Cached subtree bytes could not be decoded.
    ///
    /// Never surfaced to on-demand callers; it triggers a recompute.
    #[error("Malformed subtree artifact: {0}")]
    MalformedArtifact(String),

    /// The resource cache cannot be read or written.
    #[error("Resource cache unavailable: {0}")]
    CacheUnavailable(String),

    /// A presence or materialize call failed.
    #[error("Data source error: {0}")]
    DataSource(String),

    /// Address outside the grid for its level, or not part of the dataset.
    #[error("Invalid tile address: level={level}, x={x}, y={y}")]
    InvalidAddress { level: u8, x: u32, y: u32 },

    /// Dataset or seeding settings that cannot be used.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The operation was stopped by a cancellation request.
    #[error("Operation cancelled")]
    Cancelled,
}

impl TilesError {
    /// Whether this error must stop the current seeding partial.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TilesError::CacheUnavailable(_))
    }
}

impl From<CacheError> for TilesError {
    fn from(err: CacheError) -> Self {
        TilesError::CacheUnavailable(err.to_string())
    }
}

impl From<DataSourceError> for TilesError {
    fn from(err: DataSourceError) -> Self {
        TilesError::DataSource(err.to_string())
    }
}
