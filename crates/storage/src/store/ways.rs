#![forbid(unsafe_code)]

use super::nodes::{insert_node_tx, node_row_at};
use super::repo::{ApplyContext, EntityRepo, missing_ids_tx};
use super::sequencer::{Member, MemberTarget, Sequencer, remove_references_tx};
use super::support::{merged_attributes_json, parse_attributes};
use super::{SqliteStore, StoreError, WayCreateRequest, WayMembers, WayNodeRow, WayRow};
use cm_core::{Action, EntityId, LonLat, MemberRef, ObjectKind, Payload, RelationType, WayPayload};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

pub(crate) struct WayRepo;

impl EntityRepo for WayRepo {
    const KIND: ObjectKind = ObjectKind::Way;
    const TABLE: &'static str = "ways";
    type Payload = WayPayload;
    type Row = WayRow;

    fn payload(payload: &Payload) -> Option<&WayPayload> {
        match payload {
            Payload::Way(way) => Some(way),
            _ => None,
        }
    }

    fn validate(
        conn: &Connection,
        action: Action,
        _id: Option<EntityId>,
        payload: &WayPayload,
    ) -> Result<Vec<String>, StoreError> {
        let mut reasons = Vec::new();
        match payload.members.as_deref() {
            None if action == Action::Add => reasons.push("way_nodes: required for add way".to_string()),
            Some(members) => {
                let ids: Vec<EntityId> = members.iter().map(|m| m.target).collect();
                for id in missing_ids_tx(conn, "nodes", &ids)? {
                    reasons.push(format!("way_nodes: node {id} does not exist"));
                }
            }
            None => {}
        }
        Ok(reasons)
    }

    fn create(conn: &Connection, cx: &ApplyContext<'_>, payload: &WayPayload) -> Result<EntityId, StoreError> {
        let id = insert_way_tx(conn, cx, &payload.attributes.to_map().to_json_string()?)?;
        if let Some(members) = payload.members.as_deref() {
            Sequencer::way(conn, id).attach(&entries(members))?;
        }
        Ok(id)
    }

    fn update(conn: &Connection, cx: &ApplyContext<'_>, id: EntityId, payload: &WayPayload) -> Result<(), StoreError> {
        let data = merged_attributes_json(conn, Self::TABLE, id, &payload.attributes)?;
        conn.execute(
            "UPDATE ways SET data = COALESCE(?2, data), changeset_id = COALESCE(?3, changeset_id), updated_at_ms = ?4 \
             WHERE id = ?1",
            params![id, data, cx.changeset_id, cx.now_ms],
        )?;
        if let Some(members) = payload.members.as_deref() {
            let sequencer = Sequencer::way(conn, id);
            sequencer.clear()?;
            sequencer.attach(&entries(members))?;
        }
        Ok(())
    }

    fn delete(conn: &Connection, cx: &ApplyContext<'_>, id: EntityId, detach: Option<&[u32]>) -> Result<(), StoreError> {
        if let Some(sequences) = detach {
            Sequencer::way(conn, id).detach(sequences)?;
            conn.execute(
                "UPDATE ways SET changeset_id = COALESCE(?2, changeset_id), updated_at_ms = ?3 WHERE id = ?1",
                params![id, cx.changeset_id, cx.now_ms],
            )?;
            return Ok(());
        }
        remove_references_tx(conn, MemberTarget::Relation(RelationType::Way, id))?;
        Sequencer::way(conn, id).clear()?;
        conn.execute("DELETE FROM ways WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn find(conn: &Connection, id: EntityId) -> Result<Option<WayRow>, StoreError> {
        Ok(conn
            .query_row(
                "SELECT id, data, changeset_id, created_at_ms, updated_at_ms FROM ways WHERE id = ?1",
                params![id],
                |row| {
                    Ok(WayRow {
                        id: row.get(0)?,
                        attributes: parse_attributes(row.get(1)?)?,
                        changeset_id: row.get(2)?,
                        created_at_ms: row.get(3)?,
                        updated_at_ms: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }
}

fn entries(members: &[MemberRef]) -> Vec<(Option<u32>, Member)> {
    members
        .iter()
        .map(|m| (m.sequence, Member::WayNode { node_id: m.target }))
        .collect()
}

fn insert_way_tx(conn: &Connection, cx: &ApplyContext<'_>, data: &str) -> Result<EntityId, StoreError> {
    conn.execute(
        "INSERT INTO ways(data, changeset_id, created_at_ms, updated_at_ms) VALUES (?1, ?2, ?3, ?3)",
        params![data, cx.changeset_id, cx.now_ms],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn way_nodes_tx(conn: &Connection, way_id: EntityId) -> Result<Vec<WayNodeRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT wn.sequence_id, n.id, n.longitude, n.latitude, n.data, n.changeset_id, n.created_at_ms, n.updated_at_ms \
         FROM way_nodes wn JOIN nodes n ON n.id = wn.node_id \
         WHERE wn.way_id = ?1 ORDER BY wn.sequence_id",
    )?;
    let mut rows = stmt.query(params![way_id])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let sequence: u32 = row.get(0)?;
        let node = node_row_at(row, 1)?;
        out.push(WayNodeRow {
            way_id,
            sequence,
            node,
        });
    }
    Ok(out)
}

impl SqliteStore {
    /// Builds a way and its ordered membership in one transaction, creating
    /// nodes first when positions are given.
    pub fn way_create(&mut self, request: WayCreateRequest) -> Result<EntityId, StoreError> {
        let cx = ApplyContext {
            changeset_id: request.changeset_id.as_deref(),
            now_ms: super::support::now_ms(),
        };
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let node_ids = match &request.members {
            WayMembers::Positions(positions) => {
                let mut ids = Vec::with_capacity(positions.len());
                for position in positions {
                    let checked = LonLat::try_new(position.lon, position.lat)
                        .map_err(|err| StoreError::Rejected(err.to_string()))?;
                    ids.push(insert_node_tx(&tx, &cx, checked, &request.attributes)?);
                }
                ids
            }
            WayMembers::Nodes(ids) => ids.clone(),
        };
        if node_ids.len() < 2 {
            return Err(StoreError::Rejected("a way needs at least two nodes".to_string()));
        }
        let way_id = insert_way_tx(&tx, &cx, &request.attributes.to_json_string()?)?;
        let members: Vec<(Option<u32>, Member)> = node_ids
            .into_iter()
            .map(|node_id| (None, Member::WayNode { node_id }))
            .collect();
        Sequencer::way(&tx, way_id).attach(&members)?;
        tx.commit()?;
        Ok(way_id)
    }

    pub fn way_find(&self, id: EntityId) -> Result<Option<WayRow>, StoreError> {
        WayRepo::find(&self.conn, id)
    }

    /// Member nodes in way order.
    pub fn way_nodes(&self, way_id: EntityId) -> Result<Vec<WayNodeRow>, StoreError> {
        way_nodes_tx(&self.conn, way_id)
    }
}
