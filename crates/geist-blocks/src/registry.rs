use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;

use super::config::BlocksConfig;
use super::types::{Block, BlockId, BlockState, StateKind, StateValue};

/// Name of the state that marks block entities as never despawning.
pub const PERSISTENT_BIT: &str = "persistent_bit";

const DEFAULT_NAMESPACE: &str = "minecraft";

#[derive(Default, Clone, Debug)]
pub struct BlockRegistry {
    pub blocks: Vec<BlockType>,
    pub by_name: HashMap<String, BlockId>,
    pub namespace: String,
    air_id: BlockId,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            by_name: HashMap::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            air_id: 0,
        }
    }

    #[inline]
    pub fn get(&self, id: BlockId) -> Option<&BlockType> {
        self.blocks.get(id as usize)
    }

    /// Resolve a block name, accepting an optional `namespace:` prefix.
    pub fn id_by_name(&self, name: &str) -> Option<BlockId> {
        let bare = match name.split_once(':') {
            Some((ns, rest)) if ns == self.namespace => rest,
            _ => name,
        };
        self.by_name.get(bare).copied()
    }

    pub fn load_from_path(blocks_path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let blocks_toml = fs::read_to_string(blocks_path)?;
        Self::from_toml_str(&blocks_toml)
    }

    pub fn from_toml_str(blocks_toml: &str) -> Result<Self, Box<dyn Error>> {
        let cfg: BlocksConfig = toml::from_str(blocks_toml)?;
        Self::from_configs(cfg)
    }

    pub fn from_configs(cfg: BlocksConfig) -> Result<Self, Box<dyn Error>> {
        let mut reg = BlockRegistry::new();
        if let Some(ns) = cfg.namespace {
            reg.namespace = ns;
        }
        for def in cfg.blocks.into_iter() {
            let id = def.id.unwrap_or(reg.blocks.len() as u16);
            let state_schema = def.states.unwrap_or_default();
            for (name, values) in state_schema.iter() {
                if values.is_empty() {
                    return Err(format!("block `{}`: state `{}` has no values", def.name, name).into());
                }
                let kind = values[0].kind();
                if values.iter().any(|v| v.kind() != kind) {
                    return Err(
                        format!("block `{}`: state `{}` mixes value types", def.name, name).into(),
                    );
                }
            }
            let (state_fields, prop_index) = compute_state_layout(&state_schema);
            let ty = BlockType {
                id,
                name: def.name,
                solid: def.solid.unwrap_or(true),
                tags: def.tags.unwrap_or_default(),
                state_schema,
                state_fields,
                prop_index,
            };
            if reg.blocks.len() <= id as usize {
                reg.blocks
                    .resize(id as usize + 1, BlockType::placeholder(id));
            }
            if !reg.blocks[id as usize].name.is_empty() {
                return Err(format!("duplicate block id {id}").into());
            }
            reg.blocks[id as usize] = ty;
        }
        reg.by_name = reg
            .blocks
            .iter()
            .filter(|t| !t.name.is_empty())
            .map(|t| (t.name.clone(), t.id))
            .collect();
        reg.air_id = reg.by_name.get("air").copied().unwrap_or(0);
        Ok(reg)
    }

    #[inline]
    pub fn air(&self) -> Block {
        Block::new(self.air_id, 0)
    }

    #[inline]
    pub fn is_air(&self, b: Block) -> bool {
        b.id == self.air_id
    }

    pub fn make_block_by_name(
        &self,
        name: &str,
        props: Option<&HashMap<String, StateValue>>,
    ) -> Option<Block> {
        let id = self.id_by_name(name)?;
        let state = if let Some(p) = props {
            self.get(id).map(|ty| ty.pack_state(p)).unwrap_or(0)
        } else {
            0
        };
        Some(Block { id, state })
    }

    /// Canonical text form, e.g. `oak_log[axis=y]`. States equal to their
    /// default are omitted.
    pub fn describe(&self, b: Block) -> String {
        let Some(ty) = self.get(b.id) else {
            return format!("#{}", b.id);
        };
        let mut out = ty.name.clone();
        let props: Vec<String> = ty
            .state_fields
            .iter()
            .filter_map(|f| {
                let v = ty.state_prop_value(b.state, &f.name)?;
                (Some(v) != f.values.first()).then(|| format!("{}={}", f.name, v))
            })
            .collect();
        if !props.is_empty() {
            out.push('[');
            out.push_str(&props.join(","));
            out.push(']');
        }
        out
    }
}

/// Reasons a state assignment is rejected for a block type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateError {
    UnknownState,
    WrongType { expected: StateKind },
    NotAllowed,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::UnknownState => f.write_str("unknown state"),
            StateError::WrongType { expected } => write!(f, "expected a {expected} value"),
            StateError::NotAllowed => f.write_str("value not allowed"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BlockType {
    pub id: BlockId,
    pub name: String,
    pub solid: bool,
    pub tags: Vec<String>,
    #[allow(dead_code)]
    pub state_schema: HashMap<String, Vec<StateValue>>, // state name -> allowed values
    // Precomputed, sorted layout for fast state packing/unpacking
    pub state_fields: Vec<StateField>,
    pub prop_index: HashMap<String, usize>,
}

impl BlockType {
    fn placeholder(id: BlockId) -> Self {
        BlockType {
            id,
            name: String::new(),
            solid: false,
            tags: Vec::new(),
            state_schema: HashMap::new(),
            state_fields: Vec::new(),
            prop_index: HashMap::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StateField {
    pub name: String,
    pub values: Vec<StateValue>,
    pub bits: u32,
    pub offset: u32,
}

impl StateField {
    #[inline]
    fn mask(&self) -> u32 {
        if self.bits >= 32 {
            u32::MAX
        } else {
            (1u32 << self.bits) - 1
        }
    }

    #[inline]
    fn index_in(&self, state: BlockState) -> usize {
        if self.bits == 0 {
            return 0;
        }
        ((state >> self.offset) & self.mask()) as usize
    }

    #[inline]
    fn write(&self, state: BlockState, idx: usize) -> BlockState {
        if self.bits == 0 {
            return state;
        }
        let m = self.mask() << self.offset;
        (state & !m) | (((idx as u32) << self.offset) & m)
    }
}

fn compute_state_layout(
    schema: &HashMap<String, Vec<StateValue>>,
) -> (Vec<StateField>, HashMap<String, usize>) {
    let mut keys: Vec<&String> = schema.keys().collect();
    keys.sort();
    let mut offset: u32 = 0;
    let mut fields: Vec<StateField> = Vec::with_capacity(keys.len());
    for k in keys.into_iter() {
        let vals = schema.get(k).cloned().unwrap_or_default();
        let vlen = vals.len() as u32;
        let bits: u32 = if vlen <= 1 {
            0
        } else {
            32 - (vlen - 1).leading_zeros()
        };
        fields.push(StateField {
            name: k.to_string(),
            values: vals,
            bits,
            offset,
        });
        offset = offset.saturating_add(bits);
    }
    let mut index: HashMap<String, usize> = HashMap::with_capacity(fields.len());
    for (i, f) in fields.iter().enumerate() {
        index.insert(f.name.clone(), i);
    }
    (fields, index)
}

impl BlockType {
    #[inline]
    pub fn is_solid(&self, _state: BlockState) -> bool {
        self.solid
    }

    #[inline]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    #[inline]
    pub fn has_state(&self, prop: &str) -> bool {
        self.prop_index.contains_key(prop)
    }

    pub fn state_field(&self, prop: &str) -> Option<&StateField> {
        self.prop_index.get(prop).map(|&i| &self.state_fields[i])
    }

    pub fn state_prop_value<'a>(&'a self, state: BlockState, prop: &str) -> Option<&'a StateValue> {
        let f = self.state_field(prop)?;
        f.values.get(f.index_in(state))
    }

    pub fn state_prop_is_value(&self, state: BlockState, prop: &str, expect: &StateValue) -> bool {
        self.state_prop_value(state, prop) == Some(expect)
    }

    /// All `(name, value)` pairs of a packed state in layout order.
    pub fn state_props(&self, state: BlockState) -> Vec<(&str, &StateValue)> {
        self.state_fields
            .iter()
            .filter_map(|f| f.values.get(f.index_in(state)).map(|v| (f.name.as_str(), v)))
            .collect()
    }

    /// Check that `value` is a legal assignment for `prop`.
    pub fn validate_state(&self, prop: &str, value: &StateValue) -> Result<(), StateError> {
        let f = self.state_field(prop).ok_or(StateError::UnknownState)?;
        let expected = f.values[0].kind();
        if value.kind() != expected {
            return Err(StateError::WrongType { expected });
        }
        if !f.values.contains(value) {
            return Err(StateError::NotAllowed);
        }
        Ok(())
    }

    /// Replace one state in a packed value. `None` if the assignment is illegal.
    pub fn with_state(&self, state: BlockState, prop: &str, value: &StateValue) -> Option<BlockState> {
        let f = self.state_field(prop)?;
        let idx = f.values.iter().position(|v| v == value)?;
        Some(f.write(state, idx))
    }

    pub fn pack_state(&self, props: &HashMap<String, StateValue>) -> BlockState {
        let mut acc: BlockState = 0;
        for f in &self.state_fields {
            let sel_idx = match props.get(&f.name) {
                Some(val) => f.values.iter().position(|s| s == val).unwrap_or(0),
                None => 0,
            };
            acc = f.write(acc, sel_idx);
        }
        acc
    }

    /// Number of distinct valid permutations of this type.
    pub fn permutation_count(&self) -> usize {
        self.state_fields
            .iter()
            .map(|f| f.values.len().max(1))
            .product()
    }

    /// The `n`-th valid permutation in mixed-radix order over the sorted state
    /// fields. `n` wraps modulo [`BlockType::permutation_count`].
    pub fn nth_permutation(&self, n: usize) -> BlockState {
        let mut rest = n % self.permutation_count();
        let mut acc: BlockState = 0;
        for f in &self.state_fields {
            let radix = f.values.len().max(1);
            acc = f.write(acc, rest % radix);
            rest /= radix;
        }
        acc
    }
}
