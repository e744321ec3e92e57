use serde::Deserialize;
use std::collections::HashMap;

use crate::types::StateValue;

// Top-level blocks config file
#[derive(Deserialize, Debug, Default)]
pub struct BlocksConfig {
    pub blocks: Vec<BlockDef>,
    // Namespace accepted as an optional prefix in block names (`minecraft:stone`).
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct BlockDef {
    pub name: String,
    #[serde(default)]
    pub id: Option<u16>,
    #[serde(default)]
    pub solid: Option<bool>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    // state name -> ordered allowed values; the first value is the default
    #[serde(default)]
    pub states: Option<HashMap<String, Vec<StateValue>>>,
}
