//! Tagged node form shared by pattern and mask trees:
//! `{ "type": ..., "settings": {...}?, "children": [...]? }`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ParseError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeJson {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub settings: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeJson>,
}

impl NodeJson {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            settings: Map::new(),
            children: Vec::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.settings.insert(key.to_string(), value.into());
        self
    }

    pub fn child(mut self, child: NodeJson) -> Self {
        self.children.push(child);
        self
    }

    fn missing(&self, key: &str) -> ParseError {
        ParseError::InvalidJson(format!("`{}` node needs `{key}`", self.kind))
    }

    pub(crate) fn str(&self, key: &str) -> Result<&str> {
        self.settings
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| self.missing(key))
    }

    pub(crate) fn f64(&self, key: &str) -> Result<f64> {
        self.settings
            .get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| self.missing(key))
    }

    pub(crate) fn i64(&self, key: &str) -> Result<i64> {
        self.settings
            .get(key)
            .and_then(Value::as_i64)
            .ok_or_else(|| self.missing(key))
    }

    pub(crate) fn bool_or(&self, key: &str, default: bool) -> bool {
        self.settings.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    pub(crate) fn only_child(&self) -> Result<&NodeJson> {
        match self.children.as_slice() {
            [c] => Ok(c),
            _ => Err(ParseError::InvalidJson(format!(
                "`{}` node needs exactly one child, got {}",
                self.kind,
                self.children.len()
            ))),
        }
    }

    pub(crate) fn unknown(&self) -> ParseError {
        ParseError::InvalidJson(format!("unknown node type `{}`", self.kind))
    }
}

/// Either a source string or a tagged node.
pub(crate) enum JsonInput<'a> {
    Source(&'a str),
    Node(NodeJson),
}

pub(crate) fn classify(value: &Value) -> Result<JsonInput<'_>> {
    match value {
        Value::String(s) => Ok(JsonInput::Source(s)),
        Value::Object(_) => Ok(JsonInput::Node(serde_json::from_value(value.clone())?)),
        other => Err(ParseError::InvalidJson(format!("expected a string or an object, found {other}"))),
    }
}
