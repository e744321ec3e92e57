use geist_blocks::{Block, BlockRegistry};
use geist_parse::expr::parse_expression;

use super::node::MaskNode;
use crate::error::Result;
use crate::json::NodeJson;
use crate::literal::{parse_literal_str, render_states};
use crate::pattern::{states_from_json, states_to_json};

pub(crate) fn to_json(node: &MaskNode) -> NodeJson {
    match node {
        MaskNode::Empty => NodeJson::new("empty"),
        MaskNode::Block { name, states, .. } => NodeJson::new("block").with("block", render_states(name, states)),
        MaskNode::States { states, strict } => NodeJson::new("states")
            .with("states", states_to_json(states))
            .with("strict", *strict),
        MaskNode::Percent(p) => NodeJson::new("percent").with("chance", *p),
        MaskNode::Existing => NodeJson::new("existing"),
        MaskNode::Surface { slope } => {
            let n = NodeJson::new("surface");
            match slope {
                Some((lo, hi)) => n.with("lower", *lo).with("upper", *hi),
                None => n,
            }
        }
        MaskNode::Shadow => NodeJson::new("shadow"),
        MaskNode::Tag(t) => NodeJson::new("tag").with("tag", t.as_str()),
        MaskNode::Expr { source, .. } => NodeJson::new("expression").with("expr", source.as_str()),
        MaskNode::Offset { dy, child } => NodeJson::new("offset").with("dy", *dy).child(to_json(child)),
        MaskNode::And(children) => children
            .iter()
            .fold(NodeJson::new("intersect"), |n, c| n.child(to_json(c))),
        MaskNode::Or(children) => children
            .iter()
            .fold(NodeJson::new("chain"), |n, c| n.child(to_json(c))),
        MaskNode::Not(child) => NodeJson::new("negate").child(to_json(child)),
    }
}

pub(crate) fn from_json(node: &NodeJson, registry: &BlockRegistry) -> Result<MaskNode> {
    let children = || {
        node.children
            .iter()
            .map(|c| from_json(c, registry))
            .collect::<Result<Vec<_>>>()
    };
    Ok(match node.kind.as_str() {
        "empty" => MaskNode::Empty,
        "block" => {
            let lit = parse_literal_str(node.str("block")?, registry, false)?;
            let pins_all = registry.get(lit.block.id).is_some_and(|t| {
                !t.state_fields.is_empty()
                    && t.state_fields.iter().all(|f| lit.explicit.iter().any(|(k, _)| *k == f.name))
            });
            MaskNode::Block {
                id: lit.block.id,
                name: lit.name,
                perm: pins_all.then_some(Block::new(lit.block.id, lit.block.state)),
                states: lit.explicit,
            }
        }
        "states" => MaskNode::States {
            states: states_from_json(node)?,
            strict: node.bool_or("strict", false),
        },
        "percent" => MaskNode::Percent(node.f64("chance")?),
        "existing" => MaskNode::Existing,
        "surface" => {
            let slope = match (node.f64("lower"), node.f64("upper")) {
                (Ok(lo), Ok(hi)) => Some((lo as f32, hi as f32)),
                _ => None,
            };
            MaskNode::Surface { slope }
        }
        "shadow" => MaskNode::Shadow,
        "tag" => MaskNode::Tag(node.str("tag")?.to_string()),
        "expression" => {
            let source = node.str("expr")?.to_string();
            MaskNode::Expr {
                expr: parse_expression(&source)?,
                source,
            }
        }
        "offset" => MaskNode::Offset {
            dy: node.i64("dy")? as i32,
            child: Box::new(from_json(node.only_child()?, registry)?),
        },
        "intersect" => MaskNode::And(children()?),
        "chain" => MaskNode::Or(children()?),
        "negate" => MaskNode::Not(Box::new(from_json(node.only_child()?, registry)?)),
        _ => return Err(node.unknown()),
    })
}
