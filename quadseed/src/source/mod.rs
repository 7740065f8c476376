//! Feature data source interface.
//!
//! The engine never queries feature data directly. It asks a [`DataSource`]
//! whether a box holds any feature and, for content cells, asks it to
//! produce the tile bytes. Filter expressions are opaque strings handed
//! through unchanged.

mod points;

pub use points::{PointFeature, PointFeatureSource};

use thiserror::Error;

use crate::cache::BoxFuture;
use crate::coord::BoundingBox;

/// Failure of a presence or materialize call.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DataSourceError {
    message: String,
}

impl DataSourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Capability interface over the backing feature store.
///
/// Implementations must be callable concurrently; the walker issues
/// presence queries and content materialization from many tasks at once.
pub trait DataSource: Send + Sync {
    /// True iff at least one feature of `collection` lies in `bbox` and
    /// satisfies `filter`.
    fn presence<'a>(
        &'a self,
        collection: &'a str,
        bbox: &'a BoundingBox,
        filter: Option<&'a str>,
    ) -> BoxFuture<'a, Result<bool, DataSourceError>>;

    /// Tile content bytes for the features of `collection` in `bbox`.
    ///
    /// The format is opaque to the engine.
    fn materialize<'a>(
        &'a self,
        collection: &'a str,
        bbox: &'a BoundingBox,
        filter: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<u8>, DataSourceError>>;

    /// Name for logging.
    fn name(&self) -> &str {
        "data-source"
    }
}
