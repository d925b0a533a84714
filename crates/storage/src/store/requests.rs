#![forbid(unsafe_code)]

use cm_core::{AttributeMap, DirectiveSpec, EntityId, LonLat};
use serde::{Deserialize, Serialize};

/// A batch of directives. `id` names the changeset; an id that already exists
/// replaces the stored directive list without touching entities.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitChangesetRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directives: Option<Vec<DirectiveSpec>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodesCreateRequest {
    pub positions: Vec<LonLat>,
    /// Shared by every created node.
    pub attributes: AttributeMap,
    pub changeset_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WayMembers {
    /// Nodes are created first, one per position.
    Positions(Vec<LonLat>),
    Nodes(Vec<EntityId>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct WayCreateRequest {
    pub members: WayMembers,
    pub attributes: AttributeMap,
    pub changeset_id: Option<String>,
}
