//! Masks: which blocks an edit may touch.

mod json;
mod node;
mod parse;

use std::fmt;

use geist_blocks::BlockRegistry;
use geist_edit::{BlockAccess, BlockFilter, BlockUnit};
use geist_geom::IVec3;
use serde_json::Value;

use crate::context::EvalContext;
use crate::error::Result;
use crate::json::{JsonInput, NodeJson, classify};

pub use node::MaskNode;

#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    root: MaskNode,
    source: Option<String>,
}

impl Default for Mask {
    fn default() -> Self {
        Self::empty()
    }
}

impl Mask {
    /// The mask with no condition; it matches everything.
    pub fn empty() -> Self {
        Self::from_node(MaskNode::Empty)
    }

    pub fn from_node(root: MaskNode) -> Self {
        Self { root, source: None }
    }

    pub fn parse(src: &str, registry: &BlockRegistry) -> Result<Self> {
        let root = parse::MaskParser::new(registry, src).parse()?.optimize();
        Ok(Self {
            root,
            source: Some(src.to_string()),
        })
    }

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

    pub fn to_json(&self) -> Value {
        match &self.source {
            Some(src) => Value::String(src.clone()),
            None => self.tree_json(),
        }
    }

    pub fn tree_json(&self) -> Value {
        serde_json::to_value(self.node_json()).unwrap_or(Value::Null)
    }

    pub fn node_json(&self) -> NodeJson {
        json::to_json(&self.root)
    }

    #[inline]
    pub fn root(&self) -> &MaskNode {
        &self.root
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.root == MaskNode::Empty
    }

    pub fn matches(&self, unit: &BlockUnit<'_>, world: &dyn BlockAccess, cx: &mut EvalContext<'_>) -> bool {
        self.root.matches(unit, world, cx)
    }

    /// Test the block at `pos`; unreadable blocks never match.
    pub fn matches_at(&self, world: &dyn BlockAccess, pos: IVec3, cx: &mut EvalContext<'_>) -> bool {
        match BlockUnit::read(world, cx.registry, cx.dim, pos) {
            Ok(unit) => self.matches(&unit, world, cx),
            Err(_) => false,
        }
    }

    /// Both masks must match.
    pub fn intersect(&self, other: &Mask) -> Mask {
        let root = match (&self.root, &other.root) {
            (MaskNode::Empty, r) | (r, MaskNode::Empty) => r.clone(),
            (a, b) => MaskNode::And(vec![a.clone(), b.clone()]),
        };
        Mask::from_node(root)
    }

    pub fn negate(&self) -> Mask {
        Mask::from_node(MaskNode::Not(Box::new(self.root.clone())))
    }

    /// Test the block `dy` above instead.
    pub fn offset(&self, dy: i32) -> Mask {
        Mask::from_node(MaskNode::Offset {
            dy,
            child: Box::new(self.root.clone()),
        })
    }

    pub fn optimize(&mut self) {
        let root = std::mem::replace(&mut self.root, MaskNode::Empty);
        self.root = root.optimize();
    }

    /// Filter lists for a bulk host fill, when the tree is simple enough.
    pub fn simple_block_filter(&self, registry: &BlockRegistry) -> Option<BlockFilter> {
        self.root.simple_block_filter(registry)
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => f.write_str(src),
            None => write!(f, "{}", self.root),
        }
    }
}
