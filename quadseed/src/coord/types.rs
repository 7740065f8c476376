//! Quadtree address and bounding box types

use std::fmt;

use crate::error::TilesError;

use super::{morton_decode, MAX_LEVEL};

/// Kind of cached resource addressed by a [`TileAddress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Binary subtree availability artifact
    Subtree,
    /// Materialized tile content
    Content,
}

impl ResourceKind {
    /// Directory name used in cache paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Subtree => "subtree",
            ResourceKind::Content => "content",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned bounding box in dataset coordinates.
///
/// Cells are sliced linearly from the dataset box; `y` grows from `min_y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a bounding box from its corners.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The whole WGS84 longitude/latitude extent.
    pub fn world() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Returns true if min is strictly below max on both axes.
    pub fn is_valid(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
            && self.min_x < self.max_x
            && self.min_y < self.max_y
    }

    /// Cell `(x, y)` of the `2^level × 2^level` grid laid over this box.
    pub fn slice(&self, level: u8, x: u32, y: u32) -> BoundingBox {
        let n = (1u64 << level) as f64;
        let cell_w = self.width() / n;
        let cell_h = self.height() / n;

        BoundingBox {
            min_x: self.min_x + x as f64 * cell_w,
            min_y: self.min_y + y as f64 * cell_h,
            max_x: self.min_x + (x as f64 + 1.0) * cell_w,
            max_y: self.min_y + (y as f64 + 1.0) * cell_h,
        }
    }

    /// Returns true if the boxes share any area or edge.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    /// Half-open containment test: min edges inclusive, max edges exclusive.
    ///
    /// Adjacent cells therefore never both contain a point on their shared edge.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x < self.max_x && y >= self.min_y && y < self.max_y
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// Address of one quadtree cell resource.
///
/// Value type: derived addresses are new values, never mutations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileAddress {
    /// Dataset identifier
    pub dataset: String,
    /// Collection identifier within the dataset
    pub collection: String,
    /// Subtree artifact or tile content
    pub kind: ResourceKind,
    /// Quadtree level, 0 at the root
    pub level: u8,
    /// Column, `0 <= x < 2^level`
    pub x: u32,
    /// Row, `0 <= y < 2^level`
    pub y: u32,
}

impl TileAddress {
    /// Create a validated address.
    ///
    /// Fails with [`TilesError::InvalidAddress`] if `x` or `y` lies outside
    /// `[0, 2^level)` or the level is deeper than [`MAX_LEVEL`].
    pub fn new(
        dataset: impl Into<String>,
        collection: impl Into<String>,
        kind: ResourceKind,
        level: u8,
        x: u32,
        y: u32,
    ) -> Result<Self, TilesError> {
        if !is_valid_cell(level, x, y) {
            return Err(TilesError::InvalidAddress { level, x, y });
        }

        Ok(Self {
            dataset: dataset.into(),
            collection: collection.into(),
            kind,
            level,
            x,
            y,
        })
    }

    /// Root subtree address (level 0) of a collection.
    pub fn root(dataset: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            collection: collection.into(),
            kind: ResourceKind::Subtree,
            level: 0,
            x: 0,
            y: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.level == 0
    }

    /// Re-validate this address, e.g. after it was assembled field by field.
    pub fn validate(&self) -> Result<(), TilesError> {
        if is_valid_cell(self.level, self.x, self.y) {
            Ok(())
        } else {
            Err(TilesError::InvalidAddress {
                level: self.level,
                x: self.x,
                y: self.y,
            })
        }
    }

    /// Same cell, different resource kind.
    pub fn with_kind(&self, kind: ResourceKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// Cell bounds, sliced from the dataset root box.
    pub fn bounding_box(&self, root: &BoundingBox) -> BoundingBox {
        root.slice(self.level, self.x, self.y)
    }

    /// Descendant `depth` levels down at the given Morton index.
    ///
    /// `level + depth` must not exceed [`MAX_LEVEL`].
    pub fn descendant(&self, depth: u8, morton_index: u64) -> Self {
        debug_assert!(self.level + depth <= MAX_LEVEL);
        let (dx, dy) = morton_decode(morton_index);

        Self {
            dataset: self.dataset.clone(),
            collection: self.collection.clone(),
            kind: self.kind,
            level: self.level + depth,
            x: (self.x << depth) + dx,
            y: (self.y << depth) + dy,
        }
    }

    /// The `4^depth` subtree roots `depth` levels below, in Morton order.
    pub fn children(&self, depth: u8) -> Vec<TileAddress> {
        let count = 1u64 << (2 * depth as u32);
        (0..count)
            .map(|i| self.descendant(depth, i).with_kind(ResourceKind::Subtree))
            .collect()
    }

    /// Ancestor at `level`, or `None` if `level` is below this address.
    pub fn ancestor(&self, level: u8) -> Option<TileAddress> {
        if level > self.level {
            return None;
        }
        let shift = self.level - level;

        Some(Self {
            dataset: self.dataset.clone(),
            collection: self.collection.clone(),
            kind: self.kind,
            level,
            x: self.x >> shift,
            y: self.y >> shift,
        })
    }

    /// Address of the subtree artifact that describes this cell.
    ///
    /// Subtree roots sit on levels that are multiples of `subtree_levels`.
    pub fn containing_subtree(&self, subtree_levels: u8) -> TileAddress {
        let root_level = self.level - self.level % subtree_levels.max(1);
        let shift = self.level - root_level;

        Self {
            dataset: self.dataset.clone(),
            collection: self.collection.clone(),
            kind: ResourceKind::Subtree,
            level: root_level,
            x: self.x >> shift,
            y: self.y >> shift,
        }
    }

    /// Stable cache path: `{dataset}/{collection}/{kind}/{level}_{x}_{y}`.
    pub fn relative_path(&self) -> String {
        format!(
            "{}/{}/{}/{}_{}_{}",
            self.dataset,
            self.collection,
            self.kind.as_str(),
            self.level,
            self.x,
            self.y
        )
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {} {}/{}/{}",
            self.dataset, self.collection, self.kind, self.level, self.x, self.y
        )
    }
}

fn is_valid_cell(level: u8, x: u32, y: u32) -> bool {
    if level > MAX_LEVEL {
        return false;
    }
    let n = 1u64 << level;
    (x as u64) < n && (y as u64) < n
}
