use geist_blocks::{Block, BlockRegistry, BlockType, StateValue};
use geist_geom::IVec3;

use crate::access::{BlockAccess, DimensionId};
use crate::error::Result;

/// Transient view of one block: what is there, where, and how to query its
/// type. Built fresh per access; do not keep one across world mutations.
#[derive(Clone, Copy, Debug)]
pub struct BlockUnit<'r> {
    pub pos: IVec3,
    pub dim: DimensionId,
    pub block: Block,
    registry: &'r BlockRegistry,
}

impl<'r> BlockUnit<'r> {
    pub fn new(registry: &'r BlockRegistry, dim: DimensionId, pos: IVec3, block: Block) -> Self {
        Self {
            pos,
            dim,
            block,
            registry,
        }
    }

    /// Read the block at `pos` from `world`.
    pub fn read(
        world: &dyn BlockAccess,
        registry: &'r BlockRegistry,
        dim: DimensionId,
        pos: IVec3,
    ) -> Result<Self> {
        let block = world.block(dim, pos)?;
        Ok(Self::new(registry, dim, pos, block))
    }

    /// The unit `delta` away in the same dimension.
    pub fn offset(&self, world: &dyn BlockAccess, delta: IVec3) -> Result<BlockUnit<'r>> {
        Self::read(world, self.registry, self.dim, self.pos + delta)
    }

    #[inline]
    pub fn registry(&self) -> &'r BlockRegistry {
        self.registry
    }

    #[inline]
    pub fn ty(&self) -> Option<&'r BlockType> {
        self.registry.get(self.block.id)
    }

    pub fn type_name(&self) -> &'r str {
        self.ty().map(|t| t.name.as_str()).unwrap_or("")
    }

    #[inline]
    pub fn is_air(&self) -> bool {
        self.registry.is_air(self.block)
    }

    #[inline]
    pub fn is_solid(&self) -> bool {
        self.ty().is_some_and(|t| t.is_solid(self.block.state))
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.ty().is_some_and(|t| t.has_tag(tag))
    }

    pub fn state(&self, name: &str) -> Option<&'r StateValue> {
        self.ty()?.state_prop_value(self.block.state, name)
    }

    /// Write `block` here. Returns whether the block type changed.
    pub fn set_permutation(&mut self, world: &mut dyn BlockAccess, block: Block) -> Result<bool> {
        world.set_block(self.dim, self.pos, block)?;
        let changed = self.block.id != block.id;
        self.block = block;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EditStore;

    fn registry() -> BlockRegistry {
        BlockRegistry::from_toml_str(
            r#"
            [[blocks]]
            name = "air"
            solid = false

            [[blocks]]
            name = "log"
            tags = ["wood"]
            states = { axis = ["y", "x", "z"] }
            "#,
        )
        .unwrap()
    }

    #[test]
    fn view_queries_registry() {
        let reg = registry();
        let mut world = EditStore::new(16, 16, 16);
        let dim = DimensionId::OVERWORLD;
        let log = reg.make_block_by_name("log", None).unwrap();
        world.set_block(dim, IVec3::UP, log).unwrap();

        let below = BlockUnit::read(&world, &reg, dim, IVec3::ZERO).unwrap();
        assert!(below.is_air());
        assert!(!below.is_solid());
        let above = below.offset(&world, IVec3::UP).unwrap();
        assert_eq!(above.type_name(), "log");
        assert!(above.has_tag("wood"));
        assert_eq!(above.state("axis"), Some(&StateValue::Str("y".into())));
    }

    #[test]
    fn set_permutation_reports_type_change() {
        let reg = registry();
        let mut world = EditStore::new(16, 16, 16);
        let dim = DimensionId::OVERWORLD;
        let log_y = reg.make_block_by_name("log", None).unwrap();
        let ty = reg.get(log_y.id).unwrap();
        let log_x = Block::new(
            log_y.id,
            ty.with_state(log_y.state, "axis", &StateValue::Str("x".into())).unwrap(),
        );
        let mut unit = BlockUnit::read(&world, &reg, dim, IVec3::ZERO).unwrap();
        assert!(unit.set_permutation(&mut world, log_y).unwrap());
        assert!(!unit.set_permutation(&mut world, log_x).unwrap());
        assert_eq!(world.block(dim, IVec3::ZERO).unwrap(), log_x);
    }
}
