use std::fmt;

use geist_blocks::{Block, BlockId};
use geist_geom::{BlockBox, IVec3};

use crate::error::Result;

/// Opaque handle of a world dimension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DimensionId(pub u8);

impl DimensionId {
    pub const OVERWORLD: DimensionId = DimensionId(0);
}

impl fmt::Display for DimensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Include/exclude lists a bulk fill can test without evaluating a mask tree.
///
/// A block passes when it is not excluded and, if any include list is
/// non-empty, appears in one of them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockFilter {
    pub include_types: Vec<BlockId>,
    pub include_permutations: Vec<Block>,
    pub exclude_types: Vec<BlockId>,
    pub exclude_permutations: Vec<Block>,
}

impl BlockFilter {
    pub fn is_empty(&self) -> bool {
        self.include_types.is_empty()
            && self.include_permutations.is_empty()
            && self.exclude_types.is_empty()
            && self.exclude_permutations.is_empty()
    }

    pub fn matches(&self, b: Block) -> bool {
        if self.exclude_types.contains(&b.id) || self.exclude_permutations.contains(&b) {
            return false;
        }
        if self.include_types.is_empty() && self.include_permutations.is_empty() {
            return true;
        }
        self.include_types.contains(&b.id) || self.include_permutations.contains(&b)
    }
}

/// The host block API. Everything that reads or writes blocks goes through
/// this trait so backends can be swapped (live world, write buffer, test
/// doubles).
pub trait BlockAccess {
    fn block(&self, dim: DimensionId, pos: IVec3) -> Result<Block>;

    fn set_block(&mut self, dim: DimensionId, pos: IVec3, block: Block) -> Result<()>;

    fn is_loaded(&self, dim: DimensionId, pos: IVec3) -> bool;

    /// Whether every block of `region` is addressable.
    fn region_loaded(&self, dim: DimensionId, region: &BlockBox) -> bool {
        region.iter().all(|p| self.is_loaded(dim, p))
    }

    /// Set every block of `region` that passes `filter` to `block`. Returns
    /// how many blocks changed type.
    fn fill(
        &mut self,
        dim: DimensionId,
        region: &BlockBox,
        block: Block,
        filter: Option<&BlockFilter>,
    ) -> Result<u64> {
        let mut changed = 0;
        for p in region.iter() {
            let prev = self.block(dim, p)?;
            if filter.is_some_and(|f| !f.matches(prev)) {
                continue;
            }
            self.set_block(dim, p, block)?;
            if prev.id != block.id {
                changed += 1;
            }
        }
        Ok(changed)
    }
}

impl<T: BlockAccess + ?Sized> BlockAccess for &mut T {
    fn block(&self, dim: DimensionId, pos: IVec3) -> Result<Block> {
        (**self).block(dim, pos)
    }

    fn set_block(&mut self, dim: DimensionId, pos: IVec3, block: Block) -> Result<()> {
        (**self).set_block(dim, pos, block)
    }

    fn is_loaded(&self, dim: DimensionId, pos: IVec3) -> bool {
        (**self).is_loaded(dim, pos)
    }

    fn region_loaded(&self, dim: DimensionId, region: &BlockBox) -> bool {
        (**self).region_loaded(dim, region)
    }

    fn fill(
        &mut self,
        dim: DimensionId,
        region: &BlockBox,
        block: Block,
        filter: Option<&BlockFilter>,
    ) -> Result<u64> {
        (**self).fill(dim, region, block, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_semantics() {
        let stone = Block::new(1, 0);
        let dirt = Block::new(2, 0);
        let open = BlockFilter::default();
        assert!(open.is_empty());
        assert!(open.matches(stone));

        let only_stone = BlockFilter {
            include_types: vec![1],
            ..Default::default()
        };
        assert!(only_stone.matches(Block::new(1, 3)));
        assert!(!only_stone.matches(dirt));

        let not_stone = BlockFilter {
            exclude_permutations: vec![stone],
            ..Default::default()
        };
        assert!(!not_stone.matches(stone));
        assert!(not_stone.matches(Block::new(1, 3)));
    }
}
