use std::fmt;

use serde::{Deserialize, Serialize};

/// Compact permutation: block type plus packed state bits.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, Debug, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub state: BlockState,
}

pub type BlockId = u16;
pub type BlockState = u32;

impl Block {
    pub const AIR: Block = Block { id: 0, state: 0 };

    #[inline]
    pub const fn new(id: BlockId, state: BlockState) -> Self {
        Self { id, state }
    }
}

/// A single state value as written in configs and block literals.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Int(i32),
    Str(String),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StateKind {
    Bool,
    Int,
    Str,
}

impl StateValue {
    #[inline]
    pub fn kind(&self) -> StateKind {
        match self {
            StateValue::Bool(_) => StateKind::Bool,
            StateValue::Int(_) => StateKind::Int,
            StateValue::Str(_) => StateKind::Str,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Bool(b) => write!(f, "{b}"),
            StateValue::Int(i) => write!(f, "{i}"),
            StateValue::Str(s) => f.write_str(s),
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StateKind::Bool => "boolean",
            StateKind::Int => "integer",
            StateKind::Str => "string",
        })
    }
}
