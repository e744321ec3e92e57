use std::fmt;

use geist_blocks::{Block, BlockId, StateValue};
use geist_edit::BlockUnit;
use geist_geom::{IVec3, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::context::{EvalContext, MAX_DEPTH, hash3};
use crate::gradient::{self, GradientKind};
use crate::literal::{render_states, render_value};

/// Weight an un-prefixed branch gets when its siblings carry `N%` weights.
pub(crate) const DEFAULT_PERCENT: f64 = 100.0;

#[derive(Clone, Debug, PartialEq)]
pub struct Weighted {
    pub weight: f64,
    pub node: PatternNode,
}

impl Weighted {
    pub fn new(weight: f64, node: PatternNode) -> Self {
        Self { weight, node }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PatternNode {
    /// A concrete permutation resolved at parse time.
    Block { block: Block, text: String },
    /// Leave the block alone.
    Void,
    /// `^id`: change the type, keeping states both types share.
    TypeSwap { id: BlockId, name: String },
    /// `^[k=v]`: rewrite only the named states.
    StateSwap { states: Vec<(String, StateValue)> },
    /// `*id`: any valid permutation of the type.
    Random { id: BlockId, name: String },
    Hand,
    Clipboard { offset: IVec3 },
    Blob { size: i32, child: Box<PatternNode> },
    Gradient { name: String, kind: GradientKind },
    Chain { children: Vec<Weighted>, weighted: bool },
    /// `N%child` outside a chain: applies with probability N/100.
    Percent { weight: f64, child: Box<PatternNode> },
    Group(Box<PatternNode>),
}

impl PatternNode {
    pub fn block(&self) -> Option<Block> {
        match self {
            PatternNode::Block { block, .. } => Some(*block),
            _ => None,
        }
    }

    /// The permutation to place at `unit`, or `None` to leave it.
    pub fn evaluate(&self, unit: &BlockUnit<'_>, cx: &mut EvalContext<'_>) -> Option<Block> {
        match self {
            PatternNode::Block { block, .. } => Some(*block),
            PatternNode::Void => None,
            PatternNode::TypeSwap { id, .. } => type_swap(unit, cx, *id),
            PatternNode::StateSwap { states } => {
                let ty = unit.ty()?;
                let mut state = unit.block.state;
                for (k, v) in states {
                    if ty.validate_state(k, v).is_ok() {
                        state = ty.with_state(state, k, v).unwrap_or(state);
                    }
                }
                Some(Block::new(unit.block.id, state))
            }
            PatternNode::Random { id, .. } => {
                let ty = cx.registry.get(*id)?;
                let n = cx.rng.gen_range(0..ty.permutation_count());
                Some(Block::new(*id, ty.nth_permutation(n)))
            }
            PatternNode::Hand => cx.hand,
            PatternNode::Clipboard { offset } => {
                let clip = cx.clipboard?;
                clip.sample_wrapped(unit.pos - cx.placement + *offset)
            }
            PatternNode::Blob { size, child } => blob(*size, child, unit, cx),
            PatternNode::Gradient { name, kind } => {
                let gradients = cx.gradients?;
                let g = gradients.get(name)?;
                if cx.depth >= MAX_DEPTH {
                    return None;
                }
                let t = gradient::position(*kind, unit.pos, cx);
                let pattern = g.pick(t, &mut cx.rng)?;
                cx.depth += 1;
                let out = pattern.root().evaluate(unit, cx);
                cx.depth -= 1;
                out
            }
            PatternNode::Chain { children, weighted } => {
                match children.len() {
                    0 => return None,
                    1 => return children[0].node.evaluate(unit, cx),
                    _ => {}
                }
                if !weighted {
                    let i = cx.rng.gen_range(0..children.len());
                    return children[i].node.evaluate(unit, cx);
                }
                let total: f64 = children.iter().map(|c| c.weight).sum();
                // no branch can win a zero-weight roulette
                if total <= 0.0 {
                    return None;
                }
                let roll = cx.rng.r#gen::<f64>() * total;
                let mut acc = 0.0;
                for c in children {
                    acc += c.weight;
                    if roll < acc {
                        return c.node.evaluate(unit, cx);
                    }
                }
                children.last().and_then(|c| c.node.evaluate(unit, cx))
            }
            PatternNode::Percent { weight, child } => {
                if cx.rng.r#gen::<f64>() * 100.0 < *weight {
                    child.evaluate(unit, cx)
                } else {
                    None
                }
            }
            PatternNode::Group(child) => child.evaluate(unit, cx),
        }
    }

    /// Normalise the tree: unwrap groups, turn `N%` branches into chain
    /// weights, flatten nested chains and merge equal siblings.
    pub fn optimize(self) -> PatternNode {
        match self {
            PatternNode::Group(child) => child.optimize(),
            PatternNode::Blob { size, child } => PatternNode::Blob {
                size,
                child: Box::new(child.optimize()),
            },
            PatternNode::Percent { weight, child } => PatternNode::Percent {
                weight,
                child: Box::new(child.optimize()),
            },
            PatternNode::Chain { children, weighted } => optimize_chain(children, weighted),
            other => other,
        }
    }

    /// Whether the whole tree is one concrete permutation.
    pub fn is_simple(&self) -> bool {
        self.block().is_some()
    }
}

fn optimize_chain(children: Vec<Weighted>, weighted: bool) -> PatternNode {
    let mut items: Vec<(f64, bool, PatternNode)> = Vec::with_capacity(children.len());
    for c in children {
        // Once weighted, a remaining percent child is a gate on its branch.
        match c.node.optimize() {
            PatternNode::Percent { weight, child } if !weighted => items.push((weight, true, *child)),
            node => items.push((c.weight, false, node)),
        }
    }
    let any_percent = items.iter().any(|(_, pct, _)| *pct);

    let mut flat: Vec<Weighted> = Vec::new();
    for (w, pct, node) in items {
        let w = if any_percent && !pct && !weighted { DEFAULT_PERCENT } else { w };
        push_flat(&mut flat, w, node);
    }

    let mut merged: Vec<Weighted> = Vec::with_capacity(flat.len());
    for c in flat {
        match merged.iter_mut().find(|m| m.node == c.node) {
            Some(m) => m.weight += c.weight,
            None => merged.push(c),
        }
    }

    if merged.len() == 1 {
        return merged.remove(0).node;
    }
    let uneven = merged.windows(2).any(|w| w[0].weight != w[1].weight);
    let gated = merged.iter().any(|c| matches!(c.node, PatternNode::Percent { .. }));
    PatternNode::Chain {
        weighted: weighted || any_percent || uneven || gated,
        children: merged,
    }
}

/// Splice a nested chain's children into `out`, scaled so the nested chain
/// keeps its share `w` of the outer roulette.
fn push_flat(out: &mut Vec<Weighted>, w: f64, node: PatternNode) {
    match node {
        PatternNode::Chain { children, .. } => {
            let total: f64 = children.iter().map(|c| c.weight).sum();
            if total <= 0.0 {
                return;
            }
            for c in children {
                push_flat(out, w * c.weight / total, c.node);
            }
        }
        node => out.push(Weighted::new(w, node)),
    }
}

fn type_swap(unit: &BlockUnit<'_>, cx: &EvalContext<'_>, id: BlockId) -> Option<Block> {
    let to = cx.registry.get(id)?;
    let mut state = 0;
    if let Some(from) = unit.ty() {
        for (k, v) in from.state_props(unit.block.state) {
            if to.validate_state(k, v).is_ok() {
                state = to.with_state(state, k, v).unwrap_or(state);
            }
        }
    }
    Some(Block::new(id, state))
}

/// Cellular noise: every block takes the child pattern of the closest
/// jittered feature point; each cell evaluates its child with a stream
/// seeded by the cell, so a cell is uniform.
fn blob(size: i32, child: &PatternNode, unit: &BlockUnit<'_>, cx: &mut EvalContext<'_>) -> Option<Block> {
    if cx.depth >= MAX_DEPTH {
        return None;
    }
    let size = size.max(1);
    let p = unit.pos.center();
    let home = unit.pos.div_euclid(IVec3::splat(size));
    let mut best: Option<(f32, IVec3)> = None;
    for dy in -1..=1 {
        for dz in -1..=1 {
            for dx in -1..=1 {
                let cell = home + IVec3::new(dx, dy, dz);
                let d = cx.blob_cache.point(size, cell).distance(p);
                if best.is_none_or(|(bd, _)| d < bd) {
                    best = Some((d, cell));
                }
            }
        }
    }
    let (_, cell) = best?;

    let seed = u64::from(hash3(cell, size as u32));
    let outer_rng = std::mem::replace(&mut cx.rng, StdRng::seed_from_u64(seed));
    let outer_override = cx.radial_override;
    if matches!(child, PatternNode::Gradient { kind: GradientKind::Radial, .. }) {
        let min = (cell * size).as_vec3();
        let max = min + Vec3::new(size as f32, size as f32, size as f32);
        cx.radial_override = Some(gradient::local_radius(min, max));
    }
    cx.depth += 1;
    let out = child.evaluate(unit, cx);
    cx.depth -= 1;
    cx.radial_override = outer_override;
    cx.rng = outer_rng;
    out
}

fn fmt_weight(w: f64) -> String {
    format!("{w}")
}

fn needs_parens(node: &PatternNode) -> bool {
    matches!(node, PatternNode::Chain { .. })
}

impl fmt::Display for PatternNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternNode::Block { text, .. } => f.write_str(text),
            PatternNode::Void => f.write_str("void"),
            PatternNode::TypeSwap { name, .. } => write!(f, "^{name}"),
            PatternNode::StateSwap { states } => {
                let inner: Vec<String> = states.iter().map(|(k, v)| format!("{k}={}", render_value(v))).collect();
                write!(f, "^[{}]", inner.join(","))
            }
            PatternNode::Random { name, .. } => write!(f, "*{name}"),
            PatternNode::Hand => f.write_str("#hand"),
            PatternNode::Clipboard { offset } if *offset == IVec3::ZERO => f.write_str("#clipboard"),
            PatternNode::Clipboard { offset } => {
                write!(f, "#clipboard@[{},{},{}]", offset.x, offset.y, offset.z)
            }
            PatternNode::Blob { size, child } => write!(f, "#blob{size}({child})"),
            PatternNode::Gradient { name, kind } => match kind.suffix() {
                Some(s) => write!(f, "${name}.{s}"),
                None => write!(f, "${name}"),
            },
            PatternNode::Chain { children, weighted } => {
                for (i, c) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if *weighted {
                        write!(f, "{}%", fmt_weight(c.weight))?;
                    }
                    if needs_parens(&c.node) || (*weighted && matches!(c.node, PatternNode::Percent { .. })) {
                        write!(f, "({})", c.node)?;
                    } else {
                        write!(f, "{}", c.node)?;
                    }
                }
                Ok(())
            }
            PatternNode::Percent { weight, child } => {
                if needs_parens(child) {
                    write!(f, "{}%({child})", fmt_weight(*weight))
                } else {
                    write!(f, "{}%{child}", fmt_weight(*weight))
                }
            }
            PatternNode::Group(child) => write!(f, "({child})"),
        }
    }
}

/// Canonical text of a concrete permutation.
pub(crate) fn block_text(unit_registry: &geist_blocks::BlockRegistry, block: Block) -> String {
    let Some(ty) = unit_registry.get(block.id) else {
        return unit_registry.describe(block);
    };
    let states: Vec<(String, StateValue)> = ty
        .state_fields
        .iter()
        .filter_map(|field| {
            let v = ty.state_prop_value(block.state, &field.name)?;
            (Some(v) != field.values.first()).then(|| (field.name.clone(), v.clone()))
        })
        .collect();
    render_states(&ty.name, &states)
}
