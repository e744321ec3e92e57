use std::fmt;

use geist_blocks::{Block, BlockId, BlockRegistry, StateValue};
use geist_edit::{BlockAccess, BlockFilter, BlockUnit, raycast_between, raycast_first_hit};
use geist_geom::{IVec3, Vec3};
use geist_parse::{Expr, Vars};
use rand::Rng;

use crate::context::EvalContext;
use crate::literal::{render_states, render_value};

/// Blocks sampled on each horizontal axis when measuring slope.
const SLOPE_REACH: i32 = 2;
/// How far up and down the slope probe looks for terrain.
const SLOPE_PROBE: i32 = 8;

#[derive(Clone, Debug, PartialEq)]
pub enum MaskNode {
    /// No condition: matches every block.
    Empty,
    Block {
        id: BlockId,
        name: String,
        states: Vec<(String, StateValue)>,
        /// Set when `states` pins every state of the type.
        perm: Option<Block>,
    },
    /// `^[..]` (lenient) or `^=[..]` (strict) state test.
    States {
        states: Vec<(String, StateValue)>,
        strict: bool,
    },
    /// Passes with this percent chance, re-rolled per test.
    Percent(f64),
    Existing,
    Surface {
        /// Accepted slope band in degrees.
        slope: Option<(f32, f32)>,
    },
    Shadow,
    Tag(String),
    Expr { expr: Expr, source: String },
    /// Test the block `dy` above instead (`<` is +1, `>` is -1).
    Offset { dy: i32, child: Box<MaskNode> },
    And(Vec<MaskNode>),
    Or(Vec<MaskNode>),
    Not(Box<MaskNode>),
}

fn solid_at(world: &dyn BlockAccess, registry: &BlockRegistry, dim: geist_edit::DimensionId, p: IVec3) -> bool {
    world
        .block(dim, p)
        .ok()
        .and_then(|b| registry.get(b.id).map(|t| t.is_solid(b.state)))
        .unwrap_or(false)
}

fn states_match(unit: &BlockUnit<'_>, states: &[(String, StateValue)], strict: bool) -> bool {
    let Some(ty) = unit.ty() else { return false };
    states.iter().all(|(k, v)| match ty.state_prop_value(unit.block.state, k) {
        Some(have) => have == v,
        None => !strict,
    })
}

impl MaskNode {
    pub fn matches(&self, unit: &BlockUnit<'_>, world: &dyn BlockAccess, cx: &mut EvalContext<'_>) -> bool {
        match self {
            MaskNode::Empty => true,
            MaskNode::Block { id, states, .. } => unit.block.id == *id && states_match(unit, states, true),
            MaskNode::States { states, strict } => states_match(unit, states, *strict),
            MaskNode::Percent(p) => cx.rng.r#gen::<f64>() * 100.0 < *p,
            MaskNode::Existing => !unit.is_air(),
            MaskNode::Surface { slope } => {
                if !unit.is_solid() || !exposed(unit, world) {
                    return false;
                }
                match slope {
                    None => true,
                    Some((lo, hi)) => {
                        let angle = slope_angle(unit, world);
                        angle >= *lo && angle <= *hi
                    }
                }
            }
            MaskNode::Shadow => in_view(unit, world, cx.placement),
            MaskNode::Tag(tag) => unit.has_tag(tag),
            MaskNode::Expr { expr, .. } => {
                let rel = unit.pos - cx.placement;
                let vars = Vars {
                    x: unit.pos.x as f64,
                    y: unit.pos.y as f64,
                    z: unit.pos.z as f64,
                    ox: rel.x as f64,
                    oy: rel.y as f64,
                    oz: rel.z as f64,
                };
                expr.eval(&vars) > 0.0
            }
            MaskNode::Offset { dy, child } => match unit.offset(world, IVec3::new(0, *dy, 0)) {
                Ok(other) => child.matches(&other, world, cx),
                Err(_) => false,
            },
            MaskNode::And(children) => children.iter().all(|c| c.matches(unit, world, cx)),
            MaskNode::Or(children) => children.iter().any(|c| c.matches(unit, world, cx)),
            MaskNode::Not(child) => !child.matches(unit, world, cx),
        }
    }

    pub fn optimize(self) -> MaskNode {
        match self {
            MaskNode::Offset { dy, child } => match child.optimize() {
                MaskNode::Offset { dy: inner, child } => offset_or_self(dy + inner, *child),
                c => offset_or_self(dy, c),
            },
            MaskNode::Not(child) => match child.optimize() {
                MaskNode::Not(inner) => *inner,
                c => MaskNode::Not(Box::new(c)),
            },
            MaskNode::And(children) => {
                let mut flat = Vec::with_capacity(children.len());
                for c in children {
                    match c.optimize() {
                        MaskNode::Empty => {}
                        MaskNode::And(inner) => flat.extend(inner),
                        c => flat.push(c),
                    }
                }
                collapse(flat, MaskNode::And)
            }
            MaskNode::Or(children) => {
                let mut flat = Vec::with_capacity(children.len());
                for c in children {
                    match c.optimize() {
                        MaskNode::Empty => return MaskNode::Empty,
                        MaskNode::Or(inner) => {
                            for c in inner {
                                push_unique(&mut flat, c);
                            }
                        }
                        c => push_unique(&mut flat, c),
                    }
                }
                collapse(flat, MaskNode::Or)
            }
            other => other,
        }
    }

    /// Include/exclude lists equivalent to this tree, if it is a literal,
    /// an OR of literals, `#existing`, or one negation of those.
    pub fn simple_block_filter(&self, registry: &BlockRegistry) -> Option<BlockFilter> {
        match self {
            MaskNode::Empty => Some(BlockFilter::default()),
            MaskNode::Existing => Some(BlockFilter {
                exclude_types: vec![registry.air().id],
                ..BlockFilter::default()
            }),
            MaskNode::Not(inner) => {
                let f = inner.include_lists()?;
                Some(BlockFilter {
                    exclude_types: f.0,
                    exclude_permutations: f.1,
                    ..BlockFilter::default()
                })
            }
            other => {
                let (types, perms) = other.include_lists()?;
                Some(BlockFilter {
                    include_types: types,
                    include_permutations: perms,
                    ..BlockFilter::default()
                })
            }
        }
    }

    fn include_lists(&self) -> Option<(Vec<BlockId>, Vec<Block>)> {
        match self {
            MaskNode::Block { id, states, perm, .. } => match perm {
                Some(b) => Some((Vec::new(), vec![*b])),
                None if states.is_empty() => Some((vec![*id], Vec::new())),
                None => None,
            },
            MaskNode::Or(children) => {
                let mut types = Vec::new();
                let mut perms = Vec::new();
                for c in children {
                    let (t, p) = c.include_lists()?;
                    types.extend(t);
                    perms.extend(p);
                }
                Some((types, perms))
            }
            _ => None,
        }
    }
}

fn offset_or_self(dy: i32, child: MaskNode) -> MaskNode {
    if dy == 0 {
        child
    } else {
        MaskNode::Offset {
            dy,
            child: Box::new(child),
        }
    }
}

fn push_unique(items: &mut Vec<MaskNode>, node: MaskNode) {
    if !items.contains(&node) {
        items.push(node);
    }
}

fn collapse(mut items: Vec<MaskNode>, wrap: fn(Vec<MaskNode>) -> MaskNode) -> MaskNode {
    match items.len() {
        0 => MaskNode::Empty,
        1 => items.remove(0),
        _ => wrap(items),
    }
}

/// Solid with at least one air face neighbour.
fn exposed(unit: &BlockUnit<'_>, world: &dyn BlockAccess) -> bool {
    IVec3::FACES
        .iter()
        .any(|f| unit.offset(world, *f).is_ok_and(|n| n.is_air()))
}

/// Height of the topmost solid block in column `(x, z)` near `y`.
fn column_height(unit: &BlockUnit<'_>, world: &dyn BlockAccess, x: i32, z: i32) -> f32 {
    let top = Vec3::new(x as f32 + 0.5, (unit.pos.y + SLOPE_PROBE) as f32 + 0.5, z as f32 + 0.5);
    let reg = unit.registry();
    raycast_first_hit(top, Vec3::new(0.0, -1.0, 0.0), (2 * SLOPE_PROBE) as f32, |p| {
        solid_at(world, reg, unit.dim, p)
    })
    .map_or(unit.pos.y as f32, |hit| hit.block.y as f32)
}

/// Steepest terrain pitch around `unit`, in degrees.
fn slope_angle(unit: &BlockUnit<'_>, world: &dyn BlockAccess) -> f32 {
    let p = unit.pos;
    let r = SLOPE_REACH;
    let dx = column_height(unit, world, p.x + r, p.z) - column_height(unit, world, p.x - r, p.z);
    let dz = column_height(unit, world, p.x, p.z + r) - column_height(unit, world, p.x, p.z - r);
    let run = (2 * r) as f32;
    let steepest = dx.abs().max(dz.abs());
    (steepest / run).atan().to_degrees()
}

/// Whether a ray from the placer reaches this block through one of the
/// faces turned towards the placer.
fn in_view(unit: &BlockUnit<'_>, world: &dyn BlockAccess, placement: IVec3) -> bool {
    let eye = placement.center();
    let center = unit.pos.center();
    let to_eye = eye - center;
    let reg = unit.registry();
    IVec3::FACES.iter().any(|f| {
        let n = f.as_vec3();
        if n.dot(to_eye) <= 0.0 {
            return false;
        }
        let target = center + n * 0.49;
        raycast_between(eye, target, |p| p != placement && solid_at(world, reg, unit.dim, p))
            .is_some_and(|hit| hit.block == unit.pos)
    })
}

fn wrap(node: &MaskNode, f: &mut fmt::Formatter<'_>, loose: fn(&MaskNode) -> bool) -> fmt::Result {
    if loose(node) {
        write!(f, "({node})")
    } else {
        write!(f, "{node}")
    }
}

impl fmt::Display for MaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskNode::Empty => Ok(()),
            MaskNode::Block { name, states, .. } => f.write_str(&render_states(name, states)),
            MaskNode::States { states, strict } => {
                let inner: Vec<String> = states.iter().map(|(k, v)| format!("{k}={}", render_value(v))).collect();
                write!(f, "^{}[{}]", if *strict { "=" } else { "" }, inner.join(","))
            }
            MaskNode::Percent(p) => write!(f, "%{p}"),
            MaskNode::Existing => f.write_str("#existing"),
            MaskNode::Surface { slope: None } => f.write_str("#surface"),
            MaskNode::Surface { slope: Some((lo, hi)) } => write!(f, "#surface[{lo}:{hi}]"),
            MaskNode::Shadow => f.write_str("#shadow"),
            MaskNode::Tag(t) => write!(f, "##{t}"),
            MaskNode::Expr { source, .. } => write!(f, "={source}"),
            MaskNode::Offset { dy, child } => {
                let arrow = if *dy > 0 { "<" } else { ">" };
                for _ in 0..dy.unsigned_abs() {
                    f.write_str(arrow)?;
                }
                wrap(child, f, |n| matches!(n, MaskNode::And(_) | MaskNode::Or(_) | MaskNode::Empty))
            }
            MaskNode::Not(child) => {
                f.write_str("!")?;
                wrap(child, f, |n| matches!(n, MaskNode::And(_) | MaskNode::Or(_) | MaskNode::Empty))
            }
            MaskNode::And(children) => {
                for (i, c) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    wrap(c, f, |n| matches!(n, MaskNode::Or(_) | MaskNode::Empty))?;
                }
                Ok(())
            }
            MaskNode::Or(children) => {
                for (i, c) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    wrap(c, f, |n| matches!(n, MaskNode::Empty))?;
                }
                Ok(())
            }
        }
    }
}
