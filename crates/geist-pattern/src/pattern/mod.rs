//! Patterns: what to place at each block of an edit.

mod json;
mod node;
mod parse;

use std::fmt;

use geist_blocks::{Block, BlockRegistry};
use geist_edit::{BlockAccess, BlockUnit, WorldError};
use geist_geom::{BlockBox, IVec3};
use serde_json::Value;

use crate::context::EvalContext;
use crate::error::Result;
use crate::json::{JsonInput, NodeJson, classify};
use crate::mask::Mask;

pub use node::{PatternNode, Weighted};
pub(crate) use json::{states_from_json, states_to_json};
pub(crate) use node::block_text;

/// A compiled pattern plus, when it came from text, the text itself.
#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    root: PatternNode,
    source: Option<String>,
}

impl Default for Pattern {
    fn default() -> Self {
        Self::empty()
    }
}

impl Pattern {
    /// A pattern that never places anything.
    pub fn empty() -> Self {
        Self::from_node(PatternNode::Chain {
            children: Vec::new(),
            weighted: false,
        })
    }

    pub fn from_node(root: PatternNode) -> Self {
        Self { root, source: None }
    }

    /// Parse and optimize `src`.
    pub fn parse(src: &str, registry: &BlockRegistry) -> Result<Self> {
        let root = parse::PatternParser::new(registry).parse_str(src)?.optimize();
        Ok(Self {
            root,
            source: Some(src.to_string()),
        })
    }

    /// Accepts both forms [`Pattern::to_json`] produces.
    pub fn from_json(value: &Value, registry: &BlockRegistry) -> Result<Self> {
        match classify(value)? {
            JsonInput::Source(src) => Self::parse(src, registry),
            JsonInput::Node(node) => Ok(Self::from_node(json::from_json(&node, registry)?)),
        }
    }

    pub fn from_json_str(text: &str, registry: &BlockRegistry) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json(&value, registry)
    }

    /// The source string when there is one, the tagged tree otherwise.
    pub fn to_json(&self) -> Value {
        match &self.source {
            Some(src) => Value::String(src.clone()),
            None => self.tree_json(),
        }
    }

    /// Always the tagged tree form.
    pub fn tree_json(&self) -> Value {
        serde_json::to_value(self.node_json()).unwrap_or(Value::Null)
    }

    pub fn node_json(&self) -> NodeJson {
        json::to_json(&self.root)
    }

    #[inline]
    pub fn root(&self) -> &PatternNode {
        &self.root
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        matches!(&self.root, PatternNode::Chain { children, .. } if children.is_empty())
    }

    /// Add `block` as another uniformly chosen branch.
    pub fn add_block(&mut self, block: Block, registry: &BlockRegistry) {
        let leaf = PatternNode::Block {
            block,
            text: block_text(registry, block),
        };
        let root = std::mem::replace(&mut self.root, PatternNode::Void);
        self.root = match root {
            PatternNode::Chain { mut children, weighted } => {
                let w = if weighted { node::DEFAULT_PERCENT } else { 1.0 };
                children.push(Weighted::new(w, leaf));
                PatternNode::Chain { children, weighted }
            }
            other => PatternNode::Chain {
                children: vec![Weighted::new(1.0, other), Weighted::new(1.0, leaf)],
                weighted: false,
            },
        };
        self.source = None;
    }

    pub fn optimize(&mut self) {
        let root = std::mem::replace(&mut self.root, PatternNode::Void);
        self.root = root.optimize();
    }

    pub fn is_simple(&self) -> bool {
        self.root.is_simple()
    }

    pub fn simple_block(&self) -> Option<Block> {
        self.root.block()
    }

    pub fn evaluate(&self, unit: &BlockUnit<'_>, cx: &mut EvalContext<'_>) -> Option<Block> {
        self.root.evaluate(unit, cx)
    }

    /// Apply the pattern at `pos`. True only when the block's type changed;
    /// read and write failures count as no change.
    pub fn set_block(&self, world: &mut dyn BlockAccess, pos: IVec3, cx: &mut EvalContext<'_>) -> bool {
        let mut unit = match BlockUnit::read(&*world, cx.registry, cx.dim, pos) {
            Ok(u) => u,
            Err(e) => {
                log::debug!(target: "pattern", "set_block at {} skipped: {}", pos, e);
                return false;
            }
        };
        let Some(block) = self.evaluate(&unit, cx) else {
            return false;
        };
        match unit.set_permutation(world, block) {
            Ok(changed) => changed,
            Err(e) => {
                log::debug!(target: "pattern", "set_block at {} failed: {}", pos, e);
                false
            }
        }
    }

    /// Apply the pattern over `region`, optionally only where `mask`
    /// matches. Returns how many blocks changed type.
    ///
    /// A single-permutation pattern under a filterable mask becomes one
    /// bulk `fill` call.
    pub fn fill_blocks(
        &self,
        world: &mut dyn BlockAccess,
        region: &BlockBox,
        mask: Option<&Mask>,
        cx: &mut EvalContext<'_>,
    ) -> std::result::Result<u64, WorldError> {
        if let Some(block) = self.simple_block() {
            let filter = match mask {
                None => Some(None),
                Some(m) => m.simple_block_filter(cx.registry).map(|f| (!f.is_empty()).then_some(f)),
            };
            if let Some(filter) = filter {
                return world.fill(cx.dim, region, block, filter.as_ref());
            }
        }
        let mut changed = 0;
        for pos in region.iter() {
            if let Some(m) = mask {
                let unit = match BlockUnit::read(&*world, cx.registry, cx.dim, pos) {
                    Ok(u) => u,
                    Err(e) => {
                        log::debug!(target: "pattern", "mask test at {} skipped: {}", pos, e);
                        continue;
                    }
                };
                if !m.matches(&unit, &*world, cx) {
                    continue;
                }
            }
            if self.set_block(world, pos, cx) {
                changed += 1;
            }
        }
        Ok(changed)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => f.write_str(src),
            None => write!(f, "{}", self.root),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::tests::registry;
    use geist_edit::{DimensionId, EditStore};

    fn world() -> EditStore {
        EditStore::new(16, 16, 16)
    }

    #[test]
    fn void_is_a_no_op_not_air() {
        let reg = registry();
        let mut w = world();
        let stone = reg.make_block_by_name("stone", None).unwrap();
        w.set_block(DimensionId::OVERWORLD, IVec3::ZERO, stone).unwrap();
        let p = Pattern::parse("void", &reg).unwrap();
        let mut cx = EvalContext::seeded(&reg, 1);
        assert!(!p.set_block(&mut w, IVec3::ZERO, &mut cx));
        assert_eq!(w.block(DimensionId::OVERWORLD, IVec3::ZERO).unwrap(), stone);
    }

    #[test]
    fn set_block_reports_type_changes_only() {
        let reg = registry();
        let mut w = world();
        let p = Pattern::parse("oak_log[axis=x]", &reg).unwrap();
        let mut cx = EvalContext::seeded(&reg, 1);
        assert!(p.set_block(&mut w, IVec3::ZERO, &mut cx));
        let q = Pattern::parse("oak_log[axis=z]", &reg).unwrap();
        assert!(!q.set_block(&mut w, IVec3::ZERO, &mut cx));
        let unit = BlockUnit::read(&w, &reg, DimensionId::OVERWORLD, IVec3::ZERO).unwrap();
        assert_eq!(unit.state("axis"), Some(&geist_blocks::StateValue::Str("z".into())));
    }

    #[test]
    fn set_block_fails_soft_on_unloaded_chunks() {
        let reg = registry();
        let mut w = world();
        w.unload_chunk(DimensionId::OVERWORLD, IVec3::ZERO);
        let p = Pattern::parse("stone", &reg).unwrap();
        let mut cx = EvalContext::seeded(&reg, 1);
        assert!(!p.set_block(&mut w, IVec3::new(1, 1, 1), &mut cx));
    }

    #[test]
    fn type_swap_keeps_shared_states() {
        let reg = registry();
        let mut w = world();
        let chest = Pattern::parse("chest[facing=west]", &reg).unwrap();
        let mut cx = EvalContext::seeded(&reg, 1);
        chest.set_block(&mut w, IVec3::ZERO, &mut cx);
        let swap = Pattern::parse("^stairs", &reg).unwrap();
        assert!(swap.set_block(&mut w, IVec3::ZERO, &mut cx));
        let unit = BlockUnit::read(&w, &reg, DimensionId::OVERWORLD, IVec3::ZERO).unwrap();
        assert_eq!(unit.type_name(), "stairs");
        assert_eq!(unit.state("facing"), Some(&geist_blocks::StateValue::Str("west".into())));
    }

    #[test]
    fn state_swap_skips_missing_states() {
        let reg = registry();
        let mut w = world();
        let mut cx = EvalContext::seeded(&reg, 1);
        Pattern::parse("oak_log", &reg).unwrap().set_block(&mut w, IVec3::ZERO, &mut cx);
        let swap = Pattern::parse("^[axis=z,facing=north]", &reg).unwrap();
        assert!(!swap.set_block(&mut w, IVec3::ZERO, &mut cx));
        let unit = BlockUnit::read(&w, &reg, DimensionId::OVERWORLD, IVec3::ZERO).unwrap();
        assert_eq!(unit.state("axis"), Some(&geist_blocks::StateValue::Str("z".into())));
    }

    #[test]
    fn random_covers_every_permutation() {
        let reg = registry();
        let p = Pattern::parse("*wool", &reg).unwrap();
        let mut cx = EvalContext::seeded(&reg, 5);
        let unit = BlockUnit::new(&reg, DimensionId::OVERWORLD, IVec3::ZERO, Block::AIR);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(p.evaluate(&unit, &mut cx).unwrap());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn hand_and_clipboard_read_the_context() {
        let reg = registry();
        let stone = reg.make_block_by_name("stone", None).unwrap();
        let dirt = reg.make_block_by_name("dirt", None).unwrap();
        let clip = geist_edit::RegionBuffer::from_blocks(
            DimensionId::OVERWORLD,
            BlockBox::from_corners(IVec3::ZERO, IVec3::new(1, 0, 0)),
            vec![stone, dirt],
        );
        let mut cx = EvalContext::seeded(&reg, 1)
            .with_hand(Some(dirt))
            .with_clipboard(Some(&clip))
            .with_placement(IVec3::new(10, 0, 0));
        let at = |x| BlockUnit::new(&reg, DimensionId::OVERWORLD, IVec3::new(x, 0, 0), Block::AIR);
        let hand = Pattern::parse("#hand", &reg).unwrap();
        assert_eq!(hand.evaluate(&at(0), &mut cx), Some(dirt));
        let clip_p = Pattern::parse("#clipboard", &reg).unwrap();
        assert_eq!(clip_p.evaluate(&at(10), &mut cx), Some(stone));
        assert_eq!(clip_p.evaluate(&at(11), &mut cx), Some(dirt));
        assert_eq!(clip_p.evaluate(&at(12), &mut cx), Some(stone));
        assert_eq!(clip_p.evaluate(&at(9), &mut cx), Some(dirt));
        let shifted = Pattern::parse("#clipboard@[1,0,0]", &reg).unwrap();
        assert_eq!(shifted.evaluate(&at(10), &mut cx), Some(dirt));
    }

    #[test]
    fn blob_cells_are_uniform() {
        let reg = registry();
        let p = Pattern::parse("#blob4(stone,dirt,glass,wool)", &reg).unwrap();
        let mut cx = EvalContext::seeded(&reg, 2);
        let at = |p: IVec3| BlockUnit::new(&reg, DimensionId::OVERWORLD, p, Block::AIR);
        // the same position always lands in the same cell with the same pick
        for x in 0..12 {
            let a = p.evaluate(&at(IVec3::new(x, 3, 1)), &mut cx);
            let b = p.evaluate(&at(IVec3::new(x, 3, 1)), &mut cx);
            assert_eq!(a, b);
        }
        assert!(cx.blob_cache.hits > 0);
    }

    #[test]
    fn add_block_extends_and_drops_source() {
        let reg = registry();
        let mut p = Pattern::parse("stone", &reg).unwrap();
        p.add_block(reg.make_block_by_name("dirt", None).unwrap(), &reg);
        assert_eq!(p.source(), None);
        assert_eq!(p.to_string(), "stone,dirt");
        assert!(!p.is_simple());
    }

    #[test]
    fn fill_blocks_counts_type_changes() {
        let reg = registry();
        let mut w = world();
        let region = BlockBox::from_corners(IVec3::ZERO, IVec3::new(3, 3, 3));
        let mut cx = EvalContext::seeded(&reg, 1);
        let p = Pattern::parse("stone", &reg).unwrap();
        assert_eq!(p.fill_blocks(&mut w, &region, None, &mut cx).unwrap(), 64);
        assert_eq!(p.fill_blocks(&mut w, &region, None, &mut cx).unwrap(), 0);
        let mixed = Pattern::parse("dirt,void", &reg).unwrap();
        let n = mixed.fill_blocks(&mut w, &region, None, &mut cx).unwrap();
        assert!(n > 10 && n < 54, "{n}");
    }
}
