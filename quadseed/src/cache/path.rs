//! Cache path construction.

use std::path::{Path, PathBuf};

use crate::cache::traits::CacheError;
use crate::coord::TileAddress;

/// Construct the full path of a cached resource.
///
/// ```text
/// <root>/<dataset>/<collection>/<subtree|content>/<level>_<x>_<y>
/// ```
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
/// use quadseed::cache::resource_path;
/// use quadseed::coord::{ResourceKind, TileAddress};
///
/// let addr = TileAddress::new("osm", "buildings", ResourceKind::Subtree, 3, 5, 2).unwrap();
/// let path = resource_path(&PathBuf::from("/cache"), &addr).unwrap();
///
/// assert_eq!(path, PathBuf::from("/cache/osm/buildings/subtree/3_5_2"));
/// ```
pub fn resource_path(root: &Path, addr: &TileAddress) -> Result<PathBuf, CacheError> {
    check_segment(&addr.dataset)?;
    check_segment(&addr.collection)?;
    Ok(root.join(addr.relative_path()))
}

/// Directory holding every resource of a dataset.
pub fn dataset_directory(root: &Path, dataset: &str) -> Result<PathBuf, CacheError> {
    check_segment(dataset)?;
    Ok(root.join(dataset))
}

/// Identifiers become path segments; reject anything that could escape the root.
fn check_segment(segment: &str) -> Result<(), CacheError> {
    let bad = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0']);
    if bad {
        Err(CacheError::InvalidKey(segment.to_string()))
    } else {
        Ok(())
    }
}
