#![forbid(unsafe_code)]

//! Extensible key/value store for entity fields outside the fixed schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl AttrValue {
    /// Scalars only; `null`, arrays and objects have no attribute representation.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(AttrValue::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(AttrValue::Integer)
                .or_else(|| n.as_f64().map(AttrValue::Float)),
            Value::String(s) => Some(AttrValue::Text(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AttrValue::Bool(b) => Value::Bool(*b),
            AttrValue::Integer(i) => Value::from(*i),
            AttrValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            AttrValue::Text(s) => Value::String(s.clone()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap(BTreeMap<String, AttrValue>);

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: AttrValue) -> Option<AttrValue> {
        self.0.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.0.iter()
    }

    pub fn apply(&mut self, patch: &AttributePatch) {
        for key in &patch.remove {
            self.0.remove(key);
        }
        for (key, value) in &patch.set {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw)
    }
}

/// Write-time delta against an [`AttributeMap`]; `remove` comes from `null` values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributePatch {
    set: BTreeMap<String, AttrValue>,
    remove: BTreeSet<String>,
}

impl AttributePatch {
    pub fn set(&mut self, key: impl Into<String>, value: AttrValue) {
        let key = key.into();
        self.remove.remove(&key);
        self.set.insert(key, value);
    }

    pub fn remove(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.set.remove(&key);
        self.remove.insert(key);
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }

    pub fn removed(&self) -> impl Iterator<Item = &String> {
        self.remove.iter()
    }

    /// Attribute map for a fresh row; removals have nothing to act on.
    pub fn to_map(&self) -> AttributeMap {
        AttributeMap(self.set.clone())
    }
}
