//! Subtree availability artifacts and their binary encoding.
//!
//! A subtree describes `subtree_levels` levels of the quadtree below one
//! root cell:
//!
//! ```text
//!                  ┌──────────────── subtree root (level L)
//!                  ▼
//!   level L        ■                 ┐
//!   level L+1    ■ ■ ■ ■             │ tile / content availability
//!   ...                              ┘ (Σ 4^l bits, Morton order per level)
//!   level L+s    □ □ □ ... □           child subtree availability (4^s bits)
//! ```
//!
//! Artifacts are immutable once built and persisted through [`encode`] /
//! [`decode`].

mod codec;
mod header;

pub use codec::{decode, encode, HEADER_LEN, MAGIC, VERSION};

use crate::availability::{Availability, AvailabilityClass};
use crate::coord::MAX_LEVEL;
use crate::error::TilesError;

/// Availability description of one subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtreeArtifact {
    /// Number of levels described by this subtree
    pub subtree_levels: u8,
    /// Which cells exist
    pub tile_availability: Availability,
    /// Which cells carry content, one entry per content layer
    pub content_availability: Vec<Availability>,
    /// Which child subtrees exist
    pub child_subtree_availability: Availability,
}

impl SubtreeArtifact {
    /// Create an artifact with a single content layer, validating bitstream sizes.
    pub fn new(
        subtree_levels: u8,
        tile_availability: Availability,
        content_availability: Availability,
        child_subtree_availability: Availability,
    ) -> Result<Self, TilesError> {
        let artifact = Self {
            subtree_levels,
            tile_availability,
            content_availability: vec![content_availability],
            child_subtree_availability,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    /// Artifact with nothing available.
    pub fn empty(subtree_levels: u8) -> Self {
        Self {
            subtree_levels,
            tile_availability: Availability::Never,
            content_availability: vec![Availability::Never],
            child_subtree_availability: Availability::Never,
        }
    }

    /// Primary (first) content layer.
    pub fn content(&self) -> &Availability {
        self.content_availability
            .first()
            .unwrap_or(&Availability::Never)
    }

    /// Returns true if no tile, content, or child subtree is available.
    pub fn is_empty(&self) -> bool {
        self.tile_availability.is_never()
            && self.content_availability.iter().all(Availability::is_never)
            && self.child_subtree_availability.is_never()
    }

    /// Check that every bitstream has exactly `ceil(cells / 8)` bytes.
    pub fn validate(&self) -> Result<(), TilesError> {
        if self.subtree_levels == 0 || self.subtree_levels > MAX_LEVEL {
            return Err(TilesError::MalformedArtifact(format!(
                "subtree must describe 1..={} levels, got {}",
                MAX_LEVEL, self.subtree_levels
            )));
        }
        if self.content_availability.is_empty() {
            return Err(TilesError::MalformedArtifact(
                "subtree must carry at least one content layer".to_string(),
            ));
        }

        check_len(
            &self.tile_availability,
            AvailabilityClass::Tile,
            self.subtree_levels,
        )?;
        for content in &self.content_availability {
            check_len(content, AvailabilityClass::Content, self.subtree_levels)?;
        }
        check_len(
            &self.child_subtree_availability,
            AvailabilityClass::ChildSubtree,
            self.subtree_levels,
        )
    }

    /// Encode to the binary subtree format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TilesError> {
        encode(self)
    }

    /// Decode from the binary subtree format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TilesError> {
        decode(bytes)
    }
}

fn check_len(
    availability: &Availability,
    class: AvailabilityClass,
    subtree_levels: u8,
) -> Result<(), TilesError> {
    if let Some(bits) = availability.bitstream() {
        let expected = crate::availability::byte_len_for(class.cell_count(subtree_levels));
        if bits.byte_len() != expected {
            return Err(TilesError::MalformedArtifact(format!(
                "{} bitstream has {} bytes, expected {} for {} levels",
                class.name(),
                bits.byte_len(),
                expected,
                subtree_levels
            )));
        }
    }
    Ok(())
}
