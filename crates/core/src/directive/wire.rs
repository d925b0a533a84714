#![forbid(unsafe_code)]

use super::DirectiveState;
use crate::ids::{EntityId, EntityRef, RefParseError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Directive as submitted by a client.
///
/// Fields stay loosely typed here so that one malformed directive becomes a
/// per-directive validation failure instead of failing deserialization of the
/// whole batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectiveSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub way_nodes: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape_relations: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<Value>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_ref: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Value>,
    /// Opaque; carried through unmodified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geom_diff: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Value>,
}

impl DirectiveSpec {
    pub fn action_text(&self) -> Option<&str> {
        self.action.as_ref().and_then(Value::as_str)
    }

    pub fn object_text(&self) -> Option<&str> {
        self.object.as_ref().and_then(Value::as_str)
    }
}

/// Audit form of a directive: the submitted fields with references rewritten
/// to real ids, plus how the directive ended.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectiveRecord {
    #[serde(flatten)]
    pub directive: DirectiveSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<DirectiveState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl DirectiveRecord {
    pub fn from_spec(spec: &DirectiveSpec) -> Self {
        Self {
            directive: spec.clone(),
            state: None,
            reasons: Vec::new(),
        }
    }

    pub fn set_object_id(&mut self, id: EntityId) {
        self.directive.object_id = Some(Value::String(id.to_string()));
    }

    pub fn object_id_text(&self) -> Option<String> {
        self.directive.object_id.as_ref().and_then(value_as_text)
    }
}

/// Strings and numbers both stand for ids on the wire.
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("expected a string or number, got {0}")]
    NotText(String),
    #[error("sequence `{0}` is not a valid position")]
    BadSequence(String),
    #[error("malformed relation `{0}` (expected <sequence>-<Type>-<role>-<ref>)")]
    MalformedRelation(String),
    #[error(transparent)]
    Reference(#[from] RefParseError),
}

/// Splits `"<digits>-<rest>"` into its leading sequence and the remainder.
fn split_sequence(raw: &str) -> Result<(Option<u32>, &str), WireError> {
    if let Some((head, rest)) = raw.split_once('-')
        && !head.is_empty()
        && head.bytes().all(|b| b.is_ascii_digit())
        && !rest.is_empty()
    {
        let sequence = head
            .parse::<u32>()
            .map_err(|_| WireError::BadSequence(head.to_string()))?;
        return Ok((Some(sequence), rest));
    }
    Ok((None, raw))
}

/// `way_nodes` entry: `[<sequence>-]<ref>`.
pub fn parse_member(value: &Value) -> Result<(Option<u32>, EntityRef), WireError> {
    let raw = value_as_text(value).ok_or_else(|| WireError::NotText(value.to_string()))?;
    let (sequence, rest) = split_sequence(&raw)?;
    Ok((sequence, EntityRef::parse(rest)?))
}

/// Bare sequence id, or any member/relation string whose leading segment is one.
pub fn parse_sequence(value: &Value) -> Result<u32, WireError> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).map_err(|_| WireError::BadSequence(n.to_string()));
    }
    if let Some(Value::Number(n)) = value.get("sequence") {
        return n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| WireError::BadSequence(n.to_string()));
    }
    let raw = value_as_text(value).ok_or_else(|| WireError::NotText(value.to_string()))?;
    let head = raw.split('-').next().unwrap_or_default();
    head.parse::<u32>()
        .map_err(|_| WireError::BadSequence(raw.clone()))
}

/// Parts of a relation entry before type/role validation and id resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationParts {
    pub sequence: Option<u32>,
    pub relation_type: String,
    pub role: Option<String>,
    pub reference: EntityRef,
}

/// Compact string `"[<sequence>-]<Type>-<role>-<ref>"` or an object
/// `{"type", "role", "id", "sequence"}`.
pub fn parse_relation(value: &Value) -> Result<RelationParts, WireError> {
    if let Value::Object(map) = value {
        let relation_type = map
            .get("type")
            .and_then(value_as_text)
            .ok_or_else(|| WireError::MalformedRelation(value.to_string()))?;
        let role = map
            .get("role")
            .and_then(value_as_text)
            .filter(|role| !role.is_empty());
        let reference = map
            .get("id")
            .and_then(value_as_text)
            .ok_or_else(|| WireError::MalformedRelation(value.to_string()))?;
        let sequence = match map.get("sequence") {
            None | Some(Value::Null) => None,
            Some(seq) => Some(parse_sequence(seq)?),
        };
        return Ok(RelationParts {
            sequence,
            relation_type,
            role,
            reference: EntityRef::parse(&reference)?,
        });
    }

    let raw = value_as_text(value).ok_or_else(|| WireError::NotText(value.to_string()))?;
    let (sequence, rest) = split_sequence(&raw)?;
    let mut parts = rest.splitn(3, '-');
    let (Some(relation_type), Some(role), Some(reference)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(WireError::MalformedRelation(raw.clone()));
    };
    let role = role.trim();
    Ok(RelationParts {
        sequence,
        relation_type: relation_type.to_string(),
        role: (!role.is_empty()).then(|| role.to_string()),
        reference: EntityRef::parse(reference)?,
    })
}
