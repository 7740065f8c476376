//! Quadtree addressing module
//!
//! Provides the [`TileAddress`] value type plus the Morton (Z-order) and
//! cumulative level-offset helpers used to index availability bitstreams.
//!
//! Within one subtree, cells are enumerated level by level (outer to inner)
//! and in Morton order within each level:
//!
//! ```text
//! index = level_offset(relative_level) + morton_encode(local_x, local_y)
//! ```

mod types;

pub use types::{BoundingBox, ResourceKind, TileAddress};

/// Deepest supported quadtree level.
///
/// Keeps `x << depth` within `u32` for every derived address.
pub const MAX_LEVEL: u8 = 30;

/// Interleave the bits of `x` (even positions) and `y` (odd positions).
#[inline]
pub fn morton_encode(x: u32, y: u32) -> u64 {
    spread_bits(x) | (spread_bits(y) << 1)
}

/// Inverse of [`morton_encode`].
#[inline]
pub fn morton_decode(index: u64) -> (u32, u32) {
    (compact_bits(index), compact_bits(index >> 1))
}

/// Number of cells in all levels above `level` of a quadtree: `Σ_{l<level} 4^l`.
///
/// This is also the bit offset of the first cell of `level` inside a
/// level-ordered availability bitstream.
#[inline]
pub fn level_offset(level: u8) -> u64 {
    // (4^level - 1) / 3
    ((1u64 << (2 * level as u32)) - 1) / 3
}

/// Number of cells in the first `levels` levels of a quadtree.
#[inline]
pub fn cells_in_levels(levels: u8) -> u64 {
    level_offset(levels)
}

/// Number of cells on a single level: `4^level`.
#[inline]
pub fn cells_on_level(level: u8) -> u64 {
    1u64 << (2 * level as u32)
}

/// Bit index of a cell inside a subtree availability bitstream.
#[inline]
pub fn subtree_bit_index(relative_level: u8, local_x: u32, local_y: u32) -> u64 {
    level_offset(relative_level) + morton_encode(local_x, local_y)
}

/// Inverse of [`subtree_bit_index`]: `(relative_level, morton_index)` of a bit.
pub fn subtree_cell(index: u64) -> (u8, u64) {
    let mut relative_level = 0u8;
    while level_offset(relative_level + 1) <= index {
        relative_level += 1;
    }
    (relative_level, index - level_offset(relative_level))
}

fn spread_bits(v: u32) -> u64 {
    let mut v = v as u64;
    v = (v | (v << 16)) & 0x0000_FFFF_0000_FFFF;
    v = (v | (v << 8)) & 0x00FF_00FF_00FF_00FF;
    v = (v | (v << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    v = (v | (v << 2)) & 0x3333_3333_3333_3333;
    v = (v | (v << 1)) & 0x5555_5555_5555_5555;
    v
}

fn compact_bits(v: u64) -> u32 {
    let mut v = v & 0x5555_5555_5555_5555;
    v = (v | (v >> 1)) & 0x3333_3333_3333_3333;
    v = (v | (v >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    v = (v | (v >> 4)) & 0x00FF_00FF_00FF_00FF;
    v = (v | (v >> 8)) & 0x0000_FFFF_0000_FFFF;
    v = (v | (v >> 16)) & 0x0000_0000_FFFF_FFFF;
    v as u32
}
