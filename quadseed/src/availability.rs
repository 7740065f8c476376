//! Tri-state availability descriptors.
//!
//! A subtree carries three availability classes. Each is either a constant
//! (`Always` / `Never`) or a per-cell bitstream, LSB-first within each byte.

use crate::coord::{cells_in_levels, cells_on_level};

/// Which of the three availability classes a descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AvailabilityClass {
    /// Grid cells that exist
    Tile,
    /// Grid cells that carry content
    Content,
    /// Child subtrees below the last level
    ChildSubtree,
}

impl AvailabilityClass {
    /// Number of cells (bits) described for a subtree of `subtree_levels`.
    ///
    /// Tile and content availability cover every level inside the subtree;
    /// child-subtree availability covers the `4^subtree_levels` children.
    pub fn cell_count(&self, subtree_levels: u8) -> u64 {
        match self {
            AvailabilityClass::Tile | AvailabilityClass::Content => cells_in_levels(subtree_levels),
            AvailabilityClass::ChildSubtree => cells_on_level(subtree_levels),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AvailabilityClass::Tile => "tile",
            AvailabilityClass::Content => "content",
            AvailabilityClass::ChildSubtree => "child subtree",
        }
    }
}

/// Number of bytes needed to hold `cell_count` bits.
#[inline]
pub fn byte_len_for(cell_count: u64) -> usize {
    cell_count.div_ceil(8) as usize
}

/// Packed per-cell availability bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bitstream {
    bytes: Vec<u8>,
}

impl Bitstream {
    /// All-zero bitstream for `cell_count` cells.
    pub fn zeroed(cell_count: u64) -> Self {
        Self {
            bytes: vec![0u8; byte_len_for(cell_count)],
        }
    }

    /// Wrap raw bytes, e.g. read from an encoded artifact.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn get(&self, index: u64) -> bool {
        let byte = (index / 8) as usize;
        match self.bytes.get(byte) {
            Some(b) => (b >> (index % 8)) & 1 == 1,
            None => false,
        }
    }

    /// Set bit `index`. Indices beyond the buffer are ignored.
    #[inline]
    pub fn set(&mut self, index: u64) {
        let byte = (index / 8) as usize;
        if let Some(b) = self.bytes.get_mut(byte) {
            *b |= 1 << (index % 8);
        }
    }

    /// Number of set bits among the first `cell_count` cells.
    pub fn count_ones(&self, cell_count: u64) -> u64 {
        (0..cell_count).filter(|&i| self.get(i)).count() as u64
    }
}

/// Availability of one class of cells.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Availability {
    /// Every cell is available
    Always,
    /// No cell is available
    Never,
    /// Bit `i` tells whether cell `i` is available
    Bitstream(Bitstream),
}

impl Availability {
    /// Build availability from a bitstream, collapsing uniform streams.
    ///
    /// A stream with every bit set becomes `Always`, one with none set
    /// becomes `Never`.
    pub fn from_bitstream(bits: Bitstream, cell_count: u64) -> Self {
        let ones = bits.count_ones(cell_count);
        if ones == 0 {
            Availability::Never
        } else if ones == cell_count {
            Availability::Always
        } else {
            Availability::Bitstream(bits)
        }
    }

    /// Build collapsed availability from an iterator of per-cell flags.
    pub fn from_flags(flags: impl IntoIterator<Item = bool>, cell_count: u64) -> Self {
        let mut bits = Bitstream::zeroed(cell_count);
        for (i, flag) in flags.into_iter().enumerate().take(cell_count as usize) {
            if flag {
                bits.set(i as u64);
            }
        }
        Self::from_bitstream(bits, cell_count)
    }

    #[inline]
    pub fn is_available(&self, index: u64) -> bool {
        match self {
            Availability::Always => true,
            Availability::Never => false,
            Availability::Bitstream(bits) => bits.get(index),
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Availability::Never)
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Availability::Always)
    }

    /// Constant value, if this availability is constant.
    pub fn constant(&self) -> Option<u8> {
        match self {
            Availability::Always => Some(1),
            Availability::Never => Some(0),
            Availability::Bitstream(_) => None,
        }
    }

    pub fn bitstream(&self) -> Option<&Bitstream> {
        match self {
            Availability::Bitstream(bits) => Some(bits),
            _ => None,
        }
    }

    /// Count of available cells among `cell_count`.
    pub fn available_count(&self, cell_count: u64) -> u64 {
        match self {
            Availability::Always => cell_count,
            Availability::Never => 0,
            Availability::Bitstream(bits) => bits.count_ones(cell_count),
        }
    }

    /// Indices of available cells among `cell_count`.
    pub fn available_indices(&self, cell_count: u64) -> impl Iterator<Item = u64> + '_ {
        (0..cell_count).filter(move |&i| self.is_available(i))
    }
}
