#![forbid(unsafe_code)]

use super::repo::{ApplyContext, EntityRepo};
use super::sequencer::{Member, MemberTarget, Sequencer, remove_references_tx};
use super::support::{merged_attributes_json, parse_attributes};
use super::{NodeRow, NodesCreateRequest, SqliteStore, StoreError};
use cm_core::{AttributeMap, EntityId, LonLat, MemberRef, NodePayload, ObjectKind, Payload, RelationType};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

pub(crate) struct NodeRepo;

impl EntityRepo for NodeRepo {
    const KIND: ObjectKind = ObjectKind::Node;
    const TABLE: &'static str = "nodes";
    type Payload = NodePayload;
    type Row = NodeRow;

    fn payload(payload: &Payload) -> Option<&NodePayload> {
        match payload {
            Payload::Node(node) => Some(node),
            _ => None,
        }
    }

    fn create(conn: &Connection, cx: &ApplyContext<'_>, payload: &NodePayload) -> Result<EntityId, StoreError> {
        let position = payload
            .position
            .ok_or_else(|| StoreError::Rejected("geometry: required for add node".to_string()))?;
        let id = insert_node_tx(conn, cx, position, &payload.attributes.to_map())?;
        insert_into_ways_tx(conn, id, &payload.ways)?;
        Ok(id)
    }

    fn update(conn: &Connection, cx: &ApplyContext<'_>, id: EntityId, payload: &NodePayload) -> Result<(), StoreError> {
        let data = merged_attributes_json(conn, Self::TABLE, id, &payload.attributes)?;
        conn.execute(
            "UPDATE nodes SET \
               longitude = COALESCE(?2, longitude), \
               latitude = COALESCE(?3, latitude), \
               data = COALESCE(?4, data), \
               changeset_id = COALESCE(?5, changeset_id), \
               updated_at_ms = ?6 \
             WHERE id = ?1",
            params![
                id,
                payload.position.map(|p| p.lon),
                payload.position.map(|p| p.lat),
                data,
                cx.changeset_id,
                cx.now_ms
            ],
        )?;
        insert_into_ways_tx(conn, id, &payload.ways)?;
        Ok(())
    }

    fn delete(conn: &Connection, _cx: &ApplyContext<'_>, id: EntityId, _detach: Option<&[u32]>) -> Result<(), StoreError> {
        remove_references_tx(conn, MemberTarget::WayNode(id))?;
        remove_references_tx(conn, MemberTarget::Relation(RelationType::Node, id))?;
        conn.execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn find(conn: &Connection, id: EntityId) -> Result<Option<NodeRow>, StoreError> {
        Ok(conn
            .query_row(
                &format!("{NODE_COLUMNS} WHERE id = ?1"),
                params![id],
                node_row,
            )
            .optional()?)
    }
}

const NODE_COLUMNS: &str =
    "SELECT id, longitude, latitude, data, changeset_id, created_at_ms, updated_at_ms FROM nodes";

fn node_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NodeRow> {
    node_row_at(row, 0)
}

/// Reads the `NODE_COLUMNS` layout starting at column `offset`.
pub(crate) fn node_row_at(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<NodeRow> {
    Ok(NodeRow {
        id: row.get(offset)?,
        lon: row.get(offset + 1)?,
        lat: row.get(offset + 2)?,
        attributes: parse_attributes(row.get(offset + 3)?)?,
        changeset_id: row.get(offset + 4)?,
        created_at_ms: row.get(offset + 5)?,
        updated_at_ms: row.get(offset + 6)?,
    })
}

pub(crate) fn insert_node_tx(
    conn: &Connection,
    cx: &ApplyContext<'_>,
    position: LonLat,
    attributes: &AttributeMap,
) -> Result<EntityId, StoreError> {
    conn.execute(
        "INSERT INTO nodes(longitude, latitude, data, changeset_id, created_at_ms, updated_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![
            position.lon,
            position.lat,
            attributes.to_json_string()?,
            cx.changeset_id,
            cx.now_ms
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Inserts the node into each named way at the member's sequence.
fn insert_into_ways_tx(conn: &Connection, node_id: EntityId, ways: &[MemberRef]) -> Result<(), StoreError> {
    for way in ways {
        super::ways::WayRepo::ensure_exists(conn, way.target)?;
        Sequencer::way(conn, way.target).insert(&[(way.sequence, Member::WayNode { node_id })])?;
    }
    Ok(())
}

impl SqliteStore {
    /// One node per position, all sharing `attributes`; ids come back in input order.
    pub fn nodes_create(&mut self, request: NodesCreateRequest) -> Result<Vec<EntityId>, StoreError> {
        if request.positions.is_empty() {
            return Err(StoreError::InvalidInput("nodes_create needs at least one position"));
        }
        for position in &request.positions {
            LonLat::try_new(position.lon, position.lat)
                .map_err(|err| StoreError::Rejected(err.to_string()))?;
        }
        let cx = ApplyContext {
            changeset_id: request.changeset_id.as_deref(),
            now_ms: super::support::now_ms(),
        };
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut ids = Vec::with_capacity(request.positions.len());
        for position in &request.positions {
            ids.push(insert_node_tx(&tx, &cx, *position, &request.attributes)?);
        }
        tx.commit()?;
        Ok(ids)
    }

    pub fn node_find(&self, id: EntityId) -> Result<Option<NodeRow>, StoreError> {
        NodeRepo::find(&self.conn, id)
    }
}
