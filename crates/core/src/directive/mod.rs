#![forbid(unsafe_code)]

mod wire;

pub use wire::*;

use crate::attributes::AttributePatch;
use crate::ids::{EntityId, ObjectKind, TempRef};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Add,
    Edit,
    Delete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "add" => Some(Action::Add),
            "edit" => Some(Action::Edit),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one directive inside a batch ended.
///
/// A directive is pending until normalized and validated while it runs; only
/// the outcome is kept. `Skipped` means invalid, `Failed` a persistence error.
/// `RolledBack` is only reached in all-or-nothing batches; `Recorded` marks
/// audit-only resubmissions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveState {
    Applied,
    Skipped,
    Failed,
    RolledBack,
    Recorded,
}

impl DirectiveState {
    pub fn as_str(self) -> &'static str {
        match self {
            DirectiveState::Applied => "applied",
            DirectiveState::Skipped => "skipped",
            DirectiveState::Failed => "failed",
            DirectiveState::RolledBack => "rolled_back",
            DirectiveState::Recorded => "recorded",
        }
    }
}

pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = 180.0;
pub const MIN_LATITUDE: f64 = -90.0;
pub const MAX_LATITUDE: f64 = 90.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn try_new(lon: f64, lat: f64) -> Result<Self, GeometryError> {
        if !lon.is_finite() || !(MIN_LONGITUDE..=MAX_LONGITUDE).contains(&lon) {
            return Err(GeometryError::LongitudeOutOfRange(lon));
        }
        if !lat.is_finite() || !(MIN_LATITUDE..=MAX_LATITUDE).contains(&lat) {
            return Err(GeometryError::LatitudeOutOfRange(lat));
        }
        Ok(Self { lon, lat })
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("longitude {0} out of range [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("latitude {0} out of range [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("expected a [longitude, latitude] pair")]
    NotAPair,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationType {
    Node,
    Way,
    Shape,
}

impl RelationType {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationType::Node => "Node",
            RelationType::Way => "Way",
            RelationType::Shape => "Shape",
        }
    }

    /// Case-insensitive; the stored form is capitalized.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "node" => Some(RelationType::Node),
            "way" => Some(RelationType::Way),
            "shape" => Some(RelationType::Shape),
            _ => None,
        }
    }

    pub fn object_kind(self) -> ObjectKind {
        match self {
            RelationType::Node => ObjectKind::Node,
            RelationType::Way => ObjectKind::Way,
            RelationType::Shape => ObjectKind::Shape,
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationRole {
    Outer,
    Inner,
    Point,
    Center,
    Line,
}

impl RelationRole {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationRole::Outer => "outer",
            RelationRole::Inner => "inner",
            RelationRole::Point => "point",
            RelationRole::Center => "center",
            RelationRole::Line => "line",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "outer" => Some(RelationRole::Outer),
            "inner" => Some(RelationRole::Inner),
            "point" => Some(RelationRole::Point),
            "center" => Some(RelationRole::Center),
            "line" => Some(RelationRole::Line),
            _ => None,
        }
    }

    pub fn default_for(relation_type: RelationType) -> Self {
        match relation_type {
            RelationType::Node => RelationRole::Point,
            RelationType::Way => RelationRole::Line,
            RelationType::Shape => RelationRole::Outer,
        }
    }
}

impl fmt::Display for RelationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered membership reference (way node, or way a node is inserted into).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberRef {
    pub sequence: Option<u32>,
    pub target: EntityId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelationSpec {
    pub relation_type: RelationType,
    pub role: RelationRole,
    pub target: EntityId,
    pub sequence: Option<u32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateParts {
    pub year: Option<i32>,
    pub month: Option<u8>,
    pub day: Option<u8>,
}

impl DateParts {
    pub fn is_empty(&self) -> bool {
        self.year.is_none() && self.month.is_none() && self.day.is_none()
    }

    /// Comparable key; only meaningful when `year` is set.
    pub fn key(&self) -> Option<(i32, u8, u8)> {
        self.year
            .map(|year| (year, self.month.unwrap_or(1), self.day.unwrap_or(1)))
    }
}

/// Foreign scoping field: a resolved id, or a free-form label carried verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScopeValue {
    Id(EntityId),
    Label(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scope {
    pub layer: Option<ScopeValue>,
    pub period: Option<ScopeValue>,
    pub type_ref: Option<ScopeValue>,
    pub shape: Option<ScopeValue>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodePayload {
    pub position: Option<LonLat>,
    /// Ways the node is inserted into.
    pub ways: Vec<MemberRef>,
    pub attributes: AttributePatch,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WayPayload {
    /// `None` leaves membership untouched on edit.
    pub members: Option<Vec<MemberRef>>,
    pub attributes: AttributePatch,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShapePayload {
    pub type_id: Option<EntityId>,
    pub periods: Option<Vec<EntityId>>,
    pub tags: Option<Vec<EntityId>>,
    pub start: DateParts,
    pub end: DateParts,
    pub relations: Option<Vec<RelationSpec>>,
    pub attributes: AttributePatch,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerPayload {
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub level: Option<i64>,
    pub color1: Option<String>,
    pub color2: Option<String>,
    pub attributes: AttributePatch,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypePayload {
    pub name: Option<String>,
    pub layer_id: Option<EntityId>,
    pub attributes: AttributePatch,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PeriodPayload {
    pub name: Option<String>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub attributes: AttributePatch,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourcePayload {
    pub name: Option<String>,
    pub source: Option<String>,
    pub attributes: AttributePatch,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Node(NodePayload),
    Way(WayPayload),
    Shape(ShapePayload),
    Layer(LayerPayload),
    Type(TypePayload),
    Period(PeriodPayload),
    Source(SourcePayload),
    /// `detach` names member sequences to remove instead of deleting the entity.
    Delete { detach: Option<Vec<u32>> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    New(Option<TempRef>),
    Existing(EntityId),
}

impl Target {
    pub fn existing(&self) -> Option<EntityId> {
        match self {
            Target::Existing(id) => Some(*id),
            Target::New(_) => None,
        }
    }
}

/// Normalized directive: typed, with every reference resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct Directive {
    pub index: usize,
    pub action: Action,
    pub object: ObjectKind,
    pub target: Target,
    pub payload: Payload,
    pub scope: Scope,
    pub user_id: Option<i64>,
}
