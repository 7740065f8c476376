//! Routing of subtrees to seeding partials.
//!
//! Every partial visits the root. A subtree on level `subtree_levels` belongs
//! to partial `(x + y) mod n`; deeper subtrees follow their ancestor on that
//! level.

use crate::coord::TileAddress;

/// Partial owning `addr`, or `None` for the shared root subtree.
pub fn owner_of(addr: &TileAddress, subtree_levels: u8, partition_count: u32) -> Option<u32> {
    if addr.level < subtree_levels.max(1) {
        return None;
    }
    let shift = addr.level - subtree_levels.max(1);
    let x = (addr.x >> shift) as u64;
    let y = (addr.y >> shift) as u64;
    Some(((x + y) % partition_count.max(1) as u64) as u32)
}

/// Whether partial `index` walks `addr`.
pub fn is_owned(addr: &TileAddress, subtree_levels: u8, partition_count: u32, index: u32) -> bool {
    match owner_of(addr, subtree_levels, partition_count) {
        Some(owner) => owner == index,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::ResourceKind;

    fn subtree(level: u8, x: u32, y: u32) -> TileAddress {
        TileAddress::new("ds", "c", ResourceKind::Subtree, level, x, y).unwrap()
    }

    #[test]
    fn test_root_is_shared() {
        let root = subtree(0, 0, 0);
        assert_eq!(owner_of(&root, 2, 4), None);
        for i in 0..4 {
            assert!(is_owned(&root, 2, 4, i));
        }
    }

    #[test]
    fn test_first_subtree_level_uses_sum_modulo() {
        assert_eq!(owner_of(&subtree(2, 1, 2), 2, 4), Some(3));
        assert_eq!(owner_of(&subtree(2, 3, 3), 2, 4), Some(2));
        assert_eq!(owner_of(&subtree(2, 3, 3), 2, 1), Some(0));
    }

    #[test]
    fn test_deeper_subtrees_follow_ancestor() {
        // (13, 6) on level 4 shifts to (3, 1) on level 2.
        let deep = subtree(4, 13, 6);
        assert_eq!(owner_of(&deep, 2, 3), owner_of(&subtree(2, 3, 1), 2, 3));
        assert_eq!(owner_of(&deep, 2, 3), Some(1));
    }

    #[test]
    fn test_each_subtree_has_exactly_one_owner() {
        let root = subtree(0, 0, 0);
        for child in root.children(2) {
            let owners: Vec<u32> = (0..4).filter(|&i| is_owned(&child, 2, 4, i)).collect();
            assert_eq!(owners.len(), 1);
        }
    }
}
