use geist_blocks::{BlockRegistry, StateValue};
use geist_geom::IVec3;
use serde_json::{Map, Value};

use super::node::{PatternNode, Weighted, block_text};
use crate::error::{ParseError, Result};
use crate::gradient::GradientKind;
use crate::json::NodeJson;
use crate::literal::{parse_literal_str, resolve_type};

fn state_to_json(v: &StateValue) -> Value {
    match v {
        StateValue::Bool(b) => Value::Bool(*b),
        StateValue::Int(i) => Value::from(*i),
        StateValue::Str(s) => Value::String(s.clone()),
    }
}

fn state_from_json(v: &Value) -> Result<StateValue> {
    match v {
        Value::Bool(b) => Ok(StateValue::Bool(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(|i| StateValue::Int(i as i32))
            .ok_or_else(|| ParseError::InvalidJson(format!("state value {n} is not an integer"))),
        Value::String(s) => Ok(StateValue::Str(s.clone())),
        other => Err(ParseError::InvalidJson(format!("bad state value {other}"))),
    }
}

pub(crate) fn states_to_json(states: &[(String, StateValue)]) -> Value {
    let map: Map<String, Value> = states.iter().map(|(k, v)| (k.clone(), state_to_json(v))).collect();
    Value::Object(map)
}

pub(crate) fn states_from_json(node: &NodeJson) -> Result<Vec<(String, StateValue)>> {
    let Some(Value::Object(map)) = node.settings.get("states") else {
        return Err(ParseError::InvalidJson(format!("`{}` node needs `states`", node.kind)));
    };
    map.iter().map(|(k, v)| Ok((k.clone(), state_from_json(v)?))).collect()
}

pub(crate) fn to_json(node: &PatternNode) -> NodeJson {
    match node {
        PatternNode::Block { text, .. } => NodeJson::new("block").with("block", text.as_str()),
        PatternNode::Void => NodeJson::new("void"),
        PatternNode::TypeSwap { name, .. } => NodeJson::new("type").with("block", name.as_str()),
        PatternNode::StateSwap { states } => NodeJson::new("state").with("states", states_to_json(states)),
        PatternNode::Random { name, .. } => NodeJson::new("random").with("block", name.as_str()),
        PatternNode::Hand => NodeJson::new("hand"),
        PatternNode::Clipboard { offset } => {
            NodeJson::new("clipboard").with("offset", vec![offset.x, offset.y, offset.z])
        }
        PatternNode::Blob { size, child } => NodeJson::new("blob").with("size", *size).child(to_json(child)),
        PatternNode::Gradient { name, kind } => NodeJson::new("gradient")
            .with("name", name.as_str())
            .with("kind", kind.to_string()),
        PatternNode::Chain { children, weighted } => {
            let mut out = NodeJson::new("chain");
            if *weighted {
                let weights: Vec<f64> = children.iter().map(|c| c.weight).collect();
                out = out.with("weights", weights);
            }
            for c in children {
                out = out.child(to_json(&c.node));
            }
            out
        }
        PatternNode::Percent { weight, child } => {
            NodeJson::new("percent").with("weight", *weight).child(to_json(child))
        }
        PatternNode::Group(child) => NodeJson::new("group").child(to_json(child)),
    }
}

pub(crate) fn from_json(node: &NodeJson, registry: &BlockRegistry) -> Result<PatternNode> {
    Ok(match node.kind.as_str() {
        "block" => {
            let lit = parse_literal_str(node.str("block")?, registry, true)?;
            PatternNode::Block {
                block: lit.block,
                text: block_text(registry, lit.block),
            }
        }
        "void" => PatternNode::Void,
        "type" | "random" => {
            let ty = resolve_type(registry, node.str("block")?)?;
            if node.kind == "type" {
                PatternNode::TypeSwap {
                    id: ty.id,
                    name: ty.name.clone(),
                }
            } else {
                PatternNode::Random {
                    id: ty.id,
                    name: ty.name.clone(),
                }
            }
        }
        "state" => PatternNode::StateSwap {
            states: states_from_json(node)?,
        },
        "hand" => PatternNode::Hand,
        "clipboard" => {
            let offset = match node.settings.get("offset") {
                None => IVec3::ZERO,
                Some(v) => {
                    let xyz: Vec<i32> = serde_json::from_value(v.clone())?;
                    match xyz.as_slice() {
                        [x, y, z] => IVec3::new(*x, *y, *z),
                        _ => return Err(ParseError::InvalidJson("clipboard offset needs 3 values".into())),
                    }
                }
            };
            PatternNode::Clipboard { offset }
        }
        "blob" => PatternNode::Blob {
            size: node.i64("size")?.clamp(1, i32::MAX as i64) as i32,
            child: Box::new(from_json(node.only_child()?, registry)?),
        },
        "gradient" => {
            let kind = match node.settings.get("kind").and_then(Value::as_str) {
                None => GradientKind::Linear,
                Some(k) => GradientKind::from_suffix(k)
                    .ok_or_else(|| ParseError::InvalidJson(format!("unknown gradient kind `{k}`")))?,
            };
            PatternNode::Gradient {
                name: node.str("name")?.to_string(),
                kind,
            }
        }
        "chain" => {
            let weights: Option<Vec<f64>> = match node.settings.get("weights") {
                Some(v) => Some(serde_json::from_value(v.clone())?),
                None => None,
            };
            if weights.as_ref().is_some_and(|w| w.len() != node.children.len()) {
                return Err(ParseError::InvalidJson("chain weights do not match its children".into()));
            }
            let children = node
                .children
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let w = weights.as_ref().map_or(1.0, |ws| ws[i]);
                    Ok(Weighted::new(w, from_json(c, registry)?))
                })
                .collect::<Result<Vec<_>>>()?;
            PatternNode::Chain {
                children,
                weighted: weights.is_some(),
            }
        }
        "percent" => PatternNode::Percent {
            weight: node.f64("weight")?,
            child: Box::new(from_json(node.only_child()?, registry)?),
        },
        "group" => PatternNode::Group(Box::new(from_json(node.only_child()?, registry)?)),
        _ => return Err(node.unknown()),
    })
}
