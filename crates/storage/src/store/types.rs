#![forbid(unsafe_code)]

use cm_core::{
    Action, AttributeMap, DateParts, DirectiveRecord, DirectiveState, EntityId, ObjectKind,
    RelationRole, RelationType,
};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeRow {
    pub id: EntityId,
    pub lon: f64,
    pub lat: f64,
    pub attributes: AttributeMap,
    pub changeset_id: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WayRow {
    pub id: EntityId,
    pub attributes: AttributeMap,
    pub changeset_id: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WayNodeRow {
    pub way_id: EntityId,
    pub sequence: u32,
    pub node: NodeRow,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShapeRow {
    pub id: EntityId,
    pub type_id: Option<EntityId>,
    pub periods: Vec<EntityId>,
    pub tags: Vec<EntityId>,
    pub start: DateParts,
    pub end: DateParts,
    pub attributes: AttributeMap,
    pub changeset_id: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ShapeRelationRow {
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    pub id: EntityId,
    pub role: RelationRole,
    pub sequence: u32,
}

/// Shape properties plus its ordered relation objects.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShapeDetail {
    #[serde(flatten)]
    pub shape: ShapeRow,
    pub objects: Vec<ShapeRelationRow>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LayerRow {
    pub id: EntityId,
    pub name: String,
    pub short_name: String,
    pub level: Option<i64>,
    pub color1: String,
    pub color2: String,
    pub attributes: AttributeMap,
    pub changeset_id: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TypeRow {
    pub id: EntityId,
    pub name: String,
    pub layer_id: Option<EntityId>,
    pub attributes: AttributeMap,
    pub changeset_id: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PeriodRow {
    pub id: EntityId,
    pub name: String,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub attributes: AttributeMap,
    pub changeset_id: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SourceRow {
    pub id: EntityId,
    pub name: String,
    pub source: Option<String>,
    pub attributes: AttributeMap,
    pub changeset_id: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// Stored changeset: the audit list of its most recent submission.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Changeset {
    pub id: String,
    pub batch_mode: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub directives: Vec<DirectiveRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DirectiveOutcome {
    pub index: usize,
    pub action: Option<Action>,
    pub object: Option<ObjectKind>,
    /// Resolved id, as a string.
    pub object_id: Option<String>,
    pub state: DirectiveState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl DirectiveOutcome {
    pub fn is_applied(&self) -> bool {
        self.state == DirectiveState::Applied
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChangesetReceipt {
    pub id: String,
    /// `true` when an existing changeset's directive list was replaced.
    pub replaced: bool,
    pub outcomes: Vec<DirectiveOutcome>,
}
