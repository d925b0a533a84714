#![forbid(unsafe_code)]

mod query;

use super::repo::{ApplyContext, EntityRepo, missing_ids_tx};
use super::sequencer::{Member, MemberTarget, Sequencer, remove_references_tx};
use super::support::{merged_attributes_json, parse_attributes};
use super::{ShapeRelationRow, ShapeRow, SqliteStore, StoreError};
use cm_core::{
    Action, DateParts, EntityId, ObjectKind, Payload, RelationRole, RelationSpec, RelationType,
    ShapePayload,
};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

pub(crate) struct ShapeRepo;

impl EntityRepo for ShapeRepo {
    const KIND: ObjectKind = ObjectKind::Shape;
    const TABLE: &'static str = "shapes";
    type Payload = ShapePayload;
    type Row = ShapeRow;

    fn payload(payload: &Payload) -> Option<&ShapePayload> {
        match payload {
            Payload::Shape(shape) => Some(shape),
            _ => None,
        }
    }

    fn validate(
        conn: &Connection,
        action: Action,
        id: Option<EntityId>,
        payload: &ShapePayload,
    ) -> Result<Vec<String>, StoreError> {
        let mut reasons = Vec::new();
        if action == Action::Add && payload.relations.as_deref().is_none_or(<[_]>::is_empty) {
            reasons.push("shape_relations: no nodes, ways, or shapes".to_string());
        }
        if let Some(type_id) = payload.type_id
            && !missing_ids_tx(conn, "types", &[type_id])?.is_empty()
        {
            reasons.push(format!("data.type_id: type {type_id} does not exist"));
        }
        if let Some(periods) = payload.periods.as_deref() {
            for period in missing_ids_tx(conn, "periods", periods)? {
                reasons.push(format!("data.periods: period {period} does not exist"));
            }
        }
        if let Some(tags) = payload.tags.as_deref() {
            for tag in missing_ids_tx(conn, "types", tags)? {
                reasons.push(format!("data.tags: type {tag} does not exist"));
            }
        }
        if let Some(id) = id {
            let stored = Self::find(conn, id)?;
            let start = merge_date(payload.start, stored.as_ref().map(|s| s.start));
            let end = merge_date(payload.end, stored.as_ref().map(|s| s.end));
            if let (Some(from), Some(to)) = (start.key(), end.key())
                && from > to
            {
                reasons.push("data.end_year: start date is after end date".to_string());
            }
        }
        Ok(reasons)
    }

    fn create(conn: &Connection, cx: &ApplyContext<'_>, payload: &ShapePayload) -> Result<EntityId, StoreError> {
        conn.execute(
            "INSERT INTO shapes(type_id, start_year, start_month, start_day, end_year, end_month, end_day, \
                                data, changeset_id, created_at_ms, updated_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                payload.type_id,
                payload.start.year,
                payload.start.month,
                payload.start.day,
                payload.end.year,
                payload.end.month,
                payload.end.day,
                payload.attributes.to_map().to_json_string()?,
                cx.changeset_id,
                cx.now_ms
            ],
        )?;
        let id = conn.last_insert_rowid();
        replace_set_tx(conn, SetTable::Periods, id, payload.periods.as_deref().unwrap_or_default())?;
        replace_set_tx(conn, SetTable::Tags, id, payload.tags.as_deref().unwrap_or_default())?;
        let relations = payload.relations.as_deref().unwrap_or_default();
        Sequencer::shape(conn, id).attach(&relation_entries(relations))?;
        Ok(id)
    }

    fn update(conn: &Connection, cx: &ApplyContext<'_>, id: EntityId, payload: &ShapePayload) -> Result<(), StoreError> {
        let data = merged_attributes_json(conn, Self::TABLE, id, &payload.attributes)?;
        conn.execute(
            "UPDATE shapes SET \
               type_id = COALESCE(?2, type_id), \
               start_year = COALESCE(?3, start_year), \
               start_month = COALESCE(?4, start_month), \
               start_day = COALESCE(?5, start_day), \
               end_year = COALESCE(?6, end_year), \
               end_month = COALESCE(?7, end_month), \
               end_day = COALESCE(?8, end_day), \
               data = COALESCE(?9, data), \
               changeset_id = COALESCE(?10, changeset_id), \
               updated_at_ms = ?11 \
             WHERE id = ?1",
            params![
                id,
                payload.type_id,
                payload.start.year,
                payload.start.month,
                payload.start.day,
                payload.end.year,
                payload.end.month,
                payload.end.day,
                data,
                cx.changeset_id,
                cx.now_ms
            ],
        )?;
        if let Some(periods) = payload.periods.as_deref() {
            replace_set_tx(conn, SetTable::Periods, id, periods)?;
        }
        if let Some(tags) = payload.tags.as_deref() {
            replace_set_tx(conn, SetTable::Tags, id, tags)?;
        }
        if let Some(relations) = payload.relations.as_deref().filter(|r| !r.is_empty()) {
            Sequencer::shape(conn, id).insert(&relation_entries(relations))?;
        }
        Ok(())
    }

    fn delete(conn: &Connection, cx: &ApplyContext<'_>, id: EntityId, detach: Option<&[u32]>) -> Result<(), StoreError> {
        if let Some(sequences) = detach {
            Sequencer::shape(conn, id).detach(sequences)?;
            conn.execute(
                "UPDATE shapes SET changeset_id = COALESCE(?2, changeset_id), updated_at_ms = ?3 WHERE id = ?1",
                params![id, cx.changeset_id, cx.now_ms],
            )?;
            return Ok(());
        }
        remove_references_tx(conn, MemberTarget::Relation(RelationType::Shape, id))?;
        Sequencer::shape(conn, id).clear()?;
        conn.execute("DELETE FROM shape_periods WHERE shape_id = ?1", params![id])?;
        conn.execute("DELETE FROM shape_tags WHERE shape_id = ?1", params![id])?;
        conn.execute("DELETE FROM shapes WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn find(conn: &Connection, id: EntityId) -> Result<Option<ShapeRow>, StoreError> {
        let row = conn
            .query_row(
                &format!("{SHAPE_COLUMNS} WHERE s.id = ?1"),
                params![id],
                shape_row,
            )
            .optional()?;
        match row {
            Some(mut shape) => {
                shape.periods = set_members_tx(conn, SetTable::Periods, id)?;
                shape.tags = set_members_tx(conn, SetTable::Tags, id)?;
                Ok(Some(shape))
            }
            None => Ok(None),
        }
    }
}

/// Provided parts win; the stored date fills the rest.
fn merge_date(provided: DateParts, stored: Option<DateParts>) -> DateParts {
    let stored = stored.unwrap_or_default();
    DateParts {
        year: provided.year.or(stored.year),
        month: provided.month.or(stored.month),
        day: provided.day.or(stored.day),
    }
}

fn relation_entries(relations: &[RelationSpec]) -> Vec<(Option<u32>, Member)> {
    relations
        .iter()
        .map(|spec| (spec.sequence, Member::relation(spec)))
        .collect()
}

pub(crate) const SHAPE_COLUMNS: &str = "SELECT s.id, s.type_id, s.start_year, s.start_month, s.start_day, \
     s.end_year, s.end_month, s.end_day, s.data, s.changeset_id, s.created_at_ms, s.updated_at_ms \
     FROM shapes s";

/// Reads `SHAPE_COLUMNS`; periods and tags are filled in separately.
pub(crate) fn shape_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ShapeRow> {
    Ok(ShapeRow {
        id: row.get(0)?,
        type_id: row.get(1)?,
        periods: Vec::new(),
        tags: Vec::new(),
        start: DateParts {
            year: row.get(2)?,
            month: row.get(3)?,
            day: row.get(4)?,
        },
        end: DateParts {
            year: row.get(5)?,
            month: row.get(6)?,
            day: row.get(7)?,
        },
        attributes: parse_attributes(row.get(8)?)?,
        changeset_id: row.get(9)?,
        created_at_ms: row.get(10)?,
        updated_at_ms: row.get(11)?,
    })
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum SetTable {
    Periods,
    Tags,
}

impl SetTable {
    fn table(self) -> &'static str {
        match self {
            SetTable::Periods => "shape_periods",
            SetTable::Tags => "shape_tags",
        }
    }

    fn column(self) -> &'static str {
        match self {
            SetTable::Periods => "period_id",
            SetTable::Tags => "type_id",
        }
    }
}

fn replace_set_tx(conn: &Connection, set: SetTable, shape_id: EntityId, ids: &[EntityId]) -> Result<(), StoreError> {
    conn.execute(
        &format!("DELETE FROM {} WHERE shape_id = ?1", set.table()),
        params![shape_id],
    )?;
    let sql = format!(
        "INSERT OR IGNORE INTO {}(shape_id, {}) VALUES (?1, ?2)",
        set.table(),
        set.column()
    );
    for id in ids {
        conn.execute(&sql, params![shape_id, id])?;
    }
    Ok(())
}

pub(crate) fn set_members_tx(conn: &Connection, set: SetTable, shape_id: EntityId) -> Result<Vec<EntityId>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {col} FROM {table} WHERE shape_id = ?1 ORDER BY {col}",
        col = set.column(),
        table = set.table()
    ))?;
    let rows = stmt.query_map(params![shape_id], |row| row.get::<_, i64>(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Ordered relation objects of one shape.
pub(crate) fn shape_relations_tx(conn: &Connection, shape_id: EntityId) -> Result<Vec<ShapeRelationRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT relation_type, relation_id, relation_role, sequence_id FROM shape_relations \
         WHERE shape_id = ?1 ORDER BY sequence_id",
    )?;
    let mut rows = stmt.query(params![shape_id])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let relation_type: String = row.get(0)?;
        let role: String = row.get(2)?;
        out.push(ShapeRelationRow {
            relation_type: RelationType::parse(&relation_type)
                .ok_or(StoreError::InvalidInput("unknown relation type in store"))?,
            id: row.get(1)?,
            role: RelationRole::parse(&role).ok_or(StoreError::InvalidInput("unknown relation role in store"))?,
            sequence: row.get(3)?,
        });
    }
    Ok(out)
}

impl SqliteStore {
    /// Appends relations to a shape in the order of their sequences.
    pub fn shape_relations_attach(&mut self, shape_id: EntityId, relations: &[RelationSpec]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ShapeRepo::ensure_exists(&tx, shape_id)?;
        let attached = Sequencer::shape(&tx, shape_id).attach(&relation_entries(relations))?;
        tx.commit()?;
        Ok(attached)
    }

    /// Drops the named relation sequences; survivors renumber to `0..n-1`.
    pub fn shape_relations_detach(&mut self, shape_id: EntityId, sequences: &[u32]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ShapeRepo::ensure_exists(&tx, shape_id)?;
        let removed = Sequencer::shape(&tx, shape_id).detach(sequences)?;
        tx.commit()?;
        Ok(removed)
    }

    pub fn shape_relations(&self, shape_id: EntityId) -> Result<Vec<ShapeRelationRow>, StoreError> {
        shape_relations_tx(&self.conn, shape_id)
    }
}
