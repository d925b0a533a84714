#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted row id (SQLite rowid).
pub type EntityId = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Node,
    Way,
    Shape,
    Layer,
    Type,
    Period,
    Source,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 7] = [
        ObjectKind::Node,
        ObjectKind::Way,
        ObjectKind::Shape,
        ObjectKind::Layer,
        ObjectKind::Type,
        ObjectKind::Period,
        ObjectKind::Source,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Node => "node",
            ObjectKind::Way => "way",
            ObjectKind::Shape => "shape",
            ObjectKind::Layer => "layer",
            ObjectKind::Type => "type",
            ObjectKind::Period => "period",
            ObjectKind::Source => "source",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
    }

    /// Prefix used by client-side temporary ids (`n-1`, `sc-4`, ...).
    pub fn temp_prefix(self) -> &'static str {
        match self {
            ObjectKind::Node => "n",
            ObjectKind::Way => "w",
            ObjectKind::Shape => "s",
            ObjectKind::Layer => "l",
            ObjectKind::Type => "t",
            ObjectKind::Period => "p",
            ObjectKind::Source => "sc",
        }
    }

    pub fn from_temp_prefix(prefix: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.temp_prefix() == prefix)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-chosen placeholder for an entity created earlier in the same batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TempRef {
    kind: ObjectKind,
    number: u64,
}

impl TempRef {
    pub fn new(kind: ObjectKind, number: u64) -> Self {
        Self { kind, number }
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (prefix, number) = raw.trim().split_once('-')?;
        let kind = ObjectKind::from_temp_prefix(prefix)?;
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let number = number.parse::<u64>().ok()?;
        Some(Self { kind, number })
    }
}

impl fmt::Display for TempRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind.temp_prefix(), self.number)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Real(EntityId),
    Temp(TempRef),
}

impl EntityRef {
    pub fn parse(raw: &str) -> Result<Self, RefParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RefParseError::Empty);
        }
        if let Some(id) = parse_real_id(trimmed) {
            return Ok(EntityRef::Real(id));
        }
        TempRef::parse(trimmed)
            .map(EntityRef::Temp)
            .ok_or_else(|| RefParseError::Malformed(trimmed.to_string()))
    }

    pub fn temp(&self) -> Option<TempRef> {
        match self {
            EntityRef::Temp(temp) => Some(*temp),
            EntityRef::Real(_) => None,
        }
    }

    /// Real ids carry no kind, so they match any kind.
    pub fn matches_kind(&self, kind: ObjectKind) -> bool {
        match self {
            EntityRef::Real(_) => true,
            EntityRef::Temp(temp) => temp.kind() == kind,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Real(id) => write!(f, "{id}"),
            EntityRef::Temp(temp) => write!(f, "{temp}"),
        }
    }
}

pub(crate) fn parse_real_id(raw: &str) -> Option<EntityId> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<EntityId>().ok()
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RefParseError {
    #[error("reference must not be empty")]
    Empty,
    #[error("malformed reference `{0}` (expected an id or <prefix>-<number>)")]
    Malformed(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangesetId(String);

impl ChangesetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, ChangesetIdError> {
        let value = value.into();
        validate_changeset_id(&value)?;
        Ok(Self(value))
    }
}

impl fmt::Display for ChangesetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChangesetIdError {
    #[error("changeset id must not be empty")]
    Empty,
    #[error("changeset id is too long")]
    TooLong,
    #[error("changeset id contains whitespace or control characters")]
    InvalidChar,
}

fn validate_changeset_id(value: &str) -> Result<(), ChangesetIdError> {
    if value.is_empty() {
        return Err(ChangesetIdError::Empty);
    }
    if value.len() > 128 {
        return Err(ChangesetIdError::TooLong);
    }
    if value.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ChangesetIdError::InvalidChar);
    }
    Ok(())
}
