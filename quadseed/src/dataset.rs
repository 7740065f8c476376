//! Per-dataset context.
//!
//! Every engine call receives the [`DatasetContext`] explicitly; there is no
//! process-wide registry of datasets or collections.

use crate::coord::{BoundingBox, ResourceKind, TileAddress, MAX_LEVEL};
use crate::error::TilesError;

/// Filter expression applied on a range of levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelFilter {
    pub min_level: u8,
    pub max_level: u8,
    pub expression: String,
}

impl LevelFilter {
    /// Filter applied on every level.
    pub fn all_levels(expression: impl Into<String>) -> Self {
        Self {
            min_level: 0,
            max_level: MAX_LEVEL,
            expression: expression.into(),
        }
    }

    pub fn levels(min_level: u8, max_level: u8, expression: impl Into<String>) -> Self {
        Self {
            min_level,
            max_level,
            expression: expression.into(),
        }
    }

    pub fn applies_to(&self, level: u8) -> bool {
        level >= self.min_level && level <= self.max_level
    }
}

/// First filter whose level range contains `level`.
fn pick(filters: &[LevelFilter], level: u8) -> Option<&str> {
    filters
        .iter()
        .find(|f| f.applies_to(level))
        .map(|f| f.expression.as_str())
}

/// One enabled collection of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionConfig {
    pub id: String,
    /// Filters for tile availability presence queries
    pub tile_filters: Vec<LevelFilter>,
    /// Filters for content availability and materialization
    pub content_filters: Vec<LevelFilter>,
}

impl CollectionConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tile_filters: Vec::new(),
            content_filters: Vec::new(),
        }
    }

    pub fn with_tile_filter(mut self, filter: LevelFilter) -> Self {
        self.tile_filters.push(filter);
        self
    }

    pub fn with_content_filter(mut self, filter: LevelFilter) -> Self {
        self.content_filters.push(filter);
        self
    }

    pub fn tile_filter_for(&self, level: u8) -> Option<&str> {
        pick(&self.tile_filters, level)
    }

    /// Content filter for `level`, falling back to the tile filter.
    pub fn content_filter_for(&self, level: u8) -> Option<&str> {
        pick(&self.content_filters, level).or_else(|| self.tile_filter_for(level))
    }
}

/// Quadtree depth and subtree partitioning of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingScheme {
    /// Deepest level that carries tiles
    pub max_level: u8,
    /// Levels described by one subtree artifact
    pub subtree_levels: u8,
    /// Shallowest level whose cells may carry content
    pub first_level_with_content: u8,
}

impl Default for TilingScheme {
    fn default() -> Self {
        Self {
            max_level: 10,
            subtree_levels: 3,
            first_level_with_content: 0,
        }
    }
}

impl TilingScheme {
    pub fn new(max_level: u8, subtree_levels: u8, first_level_with_content: u8) -> Self {
        Self {
            max_level,
            subtree_levels,
            first_level_with_content,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.subtree_levels == 0 {
            return Err("subtree_levels must be at least 1".to_string());
        }
        if self.max_level > MAX_LEVEL {
            return Err(format!("max_level must be at most {}", MAX_LEVEL));
        }
        if self.max_level as u32 + self.subtree_levels as u32 > MAX_LEVEL as u32 + 1 {
            return Err("max_level plus subtree_levels exceeds the addressable depth".to_string());
        }
        Ok(())
    }

    /// Levels actually populated in a subtree rooted at `level`.
    ///
    /// Subtrees reaching past `max_level` are truncated.
    pub fn levels_in_subtree(&self, level: u8) -> u8 {
        let end = (level as u32 + self.subtree_levels as u32).min(self.max_level as u32 + 1);
        end.saturating_sub(level as u32) as u8
    }

    /// Whether children of a subtree rooted at `level` would lie past `max_level`.
    pub fn children_beyond_max(&self, level: u8) -> bool {
        level as u32 + self.subtree_levels as u32 > self.max_level as u32
    }

    pub fn has_content(&self, level: u8) -> bool {
        level >= self.first_level_with_content
    }

    /// Number of subtrees in the full tree rooted at a subtree on `level`.
    ///
    /// Counts every subtree root the walker would visit below and including
    /// that subtree if every child were available.
    pub fn subtree_count_below(&self, level: u8) -> u64 {
        let mut total = 0u64;
        let mut width = 1u64;
        let mut l = level as u32;
        while l < self.max_level as u32 {
            total = total.saturating_add(width);
            width = width.saturating_mul(1u64 << (2 * self.subtree_levels as u32));
            l += self.subtree_levels as u32;
        }
        total.max(1)
    }
}

/// Everything the engine needs to know about one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetContext {
    pub id: String,
    pub bounding_box: BoundingBox,
    pub tiling: TilingScheme,
    pub collections: Vec<CollectionConfig>,
}

impl DatasetContext {
    pub fn new(id: impl Into<String>, bounding_box: BoundingBox, tiling: TilingScheme) -> Self {
        Self {
            id: id.into(),
            bounding_box,
            tiling,
            collections: Vec::new(),
        }
    }

    pub fn with_collection(mut self, collection: CollectionConfig) -> Self {
        self.collections.push(collection);
        self
    }

    pub fn collection(&self, id: &str) -> Option<&CollectionConfig> {
        self.collections.iter().find(|c| c.id == id)
    }

    /// Root subtree address of every enabled collection.
    pub fn roots(&self) -> Vec<TileAddress> {
        self.collections
            .iter()
            .map(|c| TileAddress::root(self.id.clone(), c.id.clone()))
            .collect()
    }

    /// Convenience constructor for an address of this dataset.
    pub fn address(
        &self,
        collection: &str,
        kind: ResourceKind,
        level: u8,
        x: u32,
        y: u32,
    ) -> Result<TileAddress, TilesError> {
        let addr = TileAddress::new(self.id.clone(), collection, kind, level, x, y)?;
        self.check_address(&addr)?;
        Ok(addr)
    }

    /// Reject addresses that do not belong to this dataset.
    ///
    /// Subtree addresses must also sit on a subtree root level.
    pub fn check_address(&self, addr: &TileAddress) -> Result<(), TilesError> {
        addr.validate()?;
        let invalid = TilesError::InvalidAddress {
            level: addr.level,
            x: addr.x,
            y: addr.y,
        };

        if addr.dataset != self.id
            || self.collection(&addr.collection).is_none()
            || addr.level > self.tiling.max_level
        {
            return Err(invalid);
        }
        if addr.kind == ResourceKind::Subtree
            && addr.level % self.tiling.subtree_levels.max(1) != 0
        {
            return Err(invalid);
        }
        Ok(())
    }
}
