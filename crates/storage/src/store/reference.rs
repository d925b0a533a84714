#![forbid(unsafe_code)]

//! Layers, types, periods and sources: flat rows with an attribute bag.

use super::repo::{ApplyContext, EntityRepo, missing_ids_tx};
use super::support::{merged_attributes_json, parse_attributes};
use super::{LayerRow, PeriodRow, SourceRow, SqliteStore, StoreError, TypeRow};
use cm_core::{
    Action, EntityId, LayerPayload, ObjectKind, Payload, PeriodPayload, SourcePayload, TypePayload,
};
use rusqlite::{Connection, OptionalExtension, params};

fn required<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str, StoreError> {
    value
        .as_deref()
        .ok_or_else(|| StoreError::Rejected(format!("data.{field}: required")))
}

fn touch_tx(conn: &Connection, table: &str, cx: &ApplyContext<'_>, id: EntityId, data: Option<String>) -> Result<(), StoreError> {
    conn.execute(
        &format!(
            "UPDATE {table} SET data = COALESCE(?2, data), changeset_id = COALESCE(?3, changeset_id), \
             updated_at_ms = ?4 WHERE id = ?1"
        ),
        params![id, data, cx.changeset_id, cx.now_ms],
    )?;
    Ok(())
}

fn delete_row_tx(conn: &Connection, table: &str, id: EntityId) -> Result<(), StoreError> {
    conn.execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])?;
    Ok(())
}

pub(crate) struct LayerRepo;

impl EntityRepo for LayerRepo {
    const KIND: ObjectKind = ObjectKind::Layer;
    const TABLE: &'static str = "layers";
    type Payload = LayerPayload;
    type Row = LayerRow;

    fn payload(payload: &Payload) -> Option<&LayerPayload> {
        match payload {
            Payload::Layer(layer) => Some(layer),
            _ => None,
        }
    }

    fn create(conn: &Connection, cx: &ApplyContext<'_>, payload: &LayerPayload) -> Result<EntityId, StoreError> {
        conn.execute(
            "INSERT INTO layers(name, short_name, level, color1, color2, data, changeset_id, created_at_ms, updated_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                required("name", &payload.name)?,
                required("short_name", &payload.short_name)?,
                payload.level,
                payload.color1.as_deref().unwrap_or_default(),
                payload.color2.as_deref().unwrap_or_default(),
                payload.attributes.to_map().to_json_string()?,
                cx.changeset_id,
                cx.now_ms
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update(conn: &Connection, cx: &ApplyContext<'_>, id: EntityId, payload: &LayerPayload) -> Result<(), StoreError> {
        let data = merged_attributes_json(conn, Self::TABLE, id, &payload.attributes)?;
        conn.execute(
            "UPDATE layers SET name = COALESCE(?2, name), short_name = COALESCE(?3, short_name), \
             level = COALESCE(?4, level), color1 = COALESCE(?5, color1), color2 = COALESCE(?6, color2) \
             WHERE id = ?1",
            params![
                id,
                payload.name,
                payload.short_name,
                payload.level,
                payload.color1,
                payload.color2
            ],
        )?;
        touch_tx(conn, Self::TABLE, cx, id, data)
    }

    fn delete(conn: &Connection, _cx: &ApplyContext<'_>, id: EntityId, _detach: Option<&[u32]>) -> Result<(), StoreError> {
        delete_row_tx(conn, Self::TABLE, id)
    }

    fn find(conn: &Connection, id: EntityId) -> Result<Option<LayerRow>, StoreError> {
        Ok(conn
            .query_row(
                "SELECT id, name, short_name, level, color1, color2, data, changeset_id, created_at_ms, updated_at_ms \
                 FROM layers WHERE id = ?1",
                params![id],
                |row| {
                    Ok(LayerRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        short_name: row.get(2)?,
                        level: row.get(3)?,
                        color1: row.get(4)?,
                        color2: row.get(5)?,
                        attributes: parse_attributes(row.get(6)?)?,
                        changeset_id: row.get(7)?,
                        created_at_ms: row.get(8)?,
                        updated_at_ms: row.get(9)?,
                    })
                },
            )
            .optional()?)
    }
}

pub(crate) struct TypeRepo;

impl EntityRepo for TypeRepo {
    const KIND: ObjectKind = ObjectKind::Type;
    const TABLE: &'static str = "types";
    type Payload = TypePayload;
    type Row = TypeRow;

    fn payload(payload: &Payload) -> Option<&TypePayload> {
        match payload {
            Payload::Type(type_payload) => Some(type_payload),
            _ => None,
        }
    }

    fn validate(
        conn: &Connection,
        _action: Action,
        _id: Option<EntityId>,
        payload: &TypePayload,
    ) -> Result<Vec<String>, StoreError> {
        let Some(layer_id) = payload.layer_id else {
            return Ok(Vec::new());
        };
        Ok(missing_ids_tx(conn, "layers", &[layer_id])?
            .into_iter()
            .map(|layer| format!("data.layer_id: layer {layer} does not exist"))
            .collect())
    }

    fn create(conn: &Connection, cx: &ApplyContext<'_>, payload: &TypePayload) -> Result<EntityId, StoreError> {
        conn.execute(
            "INSERT INTO types(name, layer_id, data, changeset_id, created_at_ms, updated_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                required("name", &payload.name)?,
                payload.layer_id,
                payload.attributes.to_map().to_json_string()?,
                cx.changeset_id,
                cx.now_ms
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update(conn: &Connection, cx: &ApplyContext<'_>, id: EntityId, payload: &TypePayload) -> Result<(), StoreError> {
        let data = merged_attributes_json(conn, Self::TABLE, id, &payload.attributes)?;
        conn.execute(
            "UPDATE types SET name = COALESCE(?2, name), layer_id = COALESCE(?3, layer_id) WHERE id = ?1",
            params![id, payload.name, payload.layer_id],
        )?;
        touch_tx(conn, Self::TABLE, cx, id, data)
    }

    fn delete(conn: &Connection, _cx: &ApplyContext<'_>, id: EntityId, _detach: Option<&[u32]>) -> Result<(), StoreError> {
        delete_row_tx(conn, Self::TABLE, id)
    }

    fn find(conn: &Connection, id: EntityId) -> Result<Option<TypeRow>, StoreError> {
        Ok(conn
            .query_row(
                "SELECT id, name, layer_id, data, changeset_id, created_at_ms, updated_at_ms FROM types WHERE id = ?1",
                params![id],
                |row| {
                    Ok(TypeRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        layer_id: row.get(2)?,
                        attributes: parse_attributes(row.get(3)?)?,
                        changeset_id: row.get(4)?,
                        created_at_ms: row.get(5)?,
                        updated_at_ms: row.get(6)?,
                    })
                },
            )
            .optional()?)
    }
}

pub(crate) struct PeriodRepo;

impl EntityRepo for PeriodRepo {
    const KIND: ObjectKind = ObjectKind::Period;
    const TABLE: &'static str = "periods";
    type Payload = PeriodPayload;
    type Row = PeriodRow;

    fn payload(payload: &Payload) -> Option<&PeriodPayload> {
        match payload {
            Payload::Period(period) => Some(period),
            _ => None,
        }
    }

    /// An edit that moves one bound past the stored other bound is rejected.
    fn validate(
        conn: &Connection,
        _action: Action,
        id: Option<EntityId>,
        payload: &PeriodPayload,
    ) -> Result<Vec<String>, StoreError> {
        let Some(stored) = id.map(|id| Self::find(conn, id)).transpose()?.flatten() else {
            return Ok(Vec::new());
        };
        let start = payload.start_year.or(stored.start_year);
        let end = payload.end_year.or(stored.end_year);
        Ok(match (start, end) {
            (Some(start), Some(end)) if start > end => {
                vec![format!("data.end_year: start_year {start} is after end_year {end}")]
            }
            _ => Vec::new(),
        })
    }

    fn create(conn: &Connection, cx: &ApplyContext<'_>, payload: &PeriodPayload) -> Result<EntityId, StoreError> {
        conn.execute(
            "INSERT INTO periods(name, start_year, end_year, data, changeset_id, created_at_ms, updated_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                required("name", &payload.name)?,
                payload.start_year,
                payload.end_year,
                payload.attributes.to_map().to_json_string()?,
                cx.changeset_id,
                cx.now_ms
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update(conn: &Connection, cx: &ApplyContext<'_>, id: EntityId, payload: &PeriodPayload) -> Result<(), StoreError> {
        let data = merged_attributes_json(conn, Self::TABLE, id, &payload.attributes)?;
        conn.execute(
            "UPDATE periods SET name = COALESCE(?2, name), start_year = COALESCE(?3, start_year), \
             end_year = COALESCE(?4, end_year) WHERE id = ?1",
            params![id, payload.name, payload.start_year, payload.end_year],
        )?;
        touch_tx(conn, Self::TABLE, cx, id, data)
    }

    fn delete(conn: &Connection, _cx: &ApplyContext<'_>, id: EntityId, _detach: Option<&[u32]>) -> Result<(), StoreError> {
        delete_row_tx(conn, Self::TABLE, id)
    }

    fn find(conn: &Connection, id: EntityId) -> Result<Option<PeriodRow>, StoreError> {
        Ok(conn
            .query_row(
                "SELECT id, name, start_year, end_year, data, changeset_id, created_at_ms, updated_at_ms \
                 FROM periods WHERE id = ?1",
                params![id],
                |row| {
                    Ok(PeriodRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        start_year: row.get(2)?,
                        end_year: row.get(3)?,
                        attributes: parse_attributes(row.get(4)?)?,
                        changeset_id: row.get(5)?,
                        created_at_ms: row.get(6)?,
                        updated_at_ms: row.get(7)?,
                    })
                },
            )
            .optional()?)
    }
}

pub(crate) struct SourceRepo;

impl EntityRepo for SourceRepo {
    const KIND: ObjectKind = ObjectKind::Source;
    const TABLE: &'static str = "sources";
    type Payload = SourcePayload;
    type Row = SourceRow;

    fn payload(payload: &Payload) -> Option<&SourcePayload> {
        match payload {
            Payload::Source(source) => Some(source),
            _ => None,
        }
    }

    fn create(conn: &Connection, cx: &ApplyContext<'_>, payload: &SourcePayload) -> Result<EntityId, StoreError> {
        conn.execute(
            "INSERT INTO sources(name, source, data, changeset_id, created_at_ms, updated_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                required("name", &payload.name)?,
                payload.source,
                payload.attributes.to_map().to_json_string()?,
                cx.changeset_id,
                cx.now_ms
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update(conn: &Connection, cx: &ApplyContext<'_>, id: EntityId, payload: &SourcePayload) -> Result<(), StoreError> {
        let data = merged_attributes_json(conn, Self::TABLE, id, &payload.attributes)?;
        conn.execute(
            "UPDATE sources SET name = COALESCE(?2, name), source = COALESCE(?3, source) WHERE id = ?1",
            params![id, payload.name, payload.source],
        )?;
        touch_tx(conn, Self::TABLE, cx, id, data)
    }

    fn delete(conn: &Connection, _cx: &ApplyContext<'_>, id: EntityId, _detach: Option<&[u32]>) -> Result<(), StoreError> {
        delete_row_tx(conn, Self::TABLE, id)
    }

    fn find(conn: &Connection, id: EntityId) -> Result<Option<SourceRow>, StoreError> {
        Ok(conn
            .query_row(
                "SELECT id, name, source, data, changeset_id, created_at_ms, updated_at_ms FROM sources WHERE id = ?1",
                params![id],
                |row| {
                    Ok(SourceRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        source: row.get(2)?,
                        attributes: parse_attributes(row.get(3)?)?,
                        changeset_id: row.get(4)?,
                        created_at_ms: row.get(5)?,
                        updated_at_ms: row.get(6)?,
                    })
                },
            )
            .optional()?)
    }
}

impl SqliteStore {
    pub fn layer_find(&self, id: EntityId) -> Result<Option<LayerRow>, StoreError> {
        LayerRepo::find(&self.conn, id)
    }

    pub fn type_find(&self, id: EntityId) -> Result<Option<TypeRow>, StoreError> {
        TypeRepo::find(&self.conn, id)
    }

    pub fn period_find(&self, id: EntityId) -> Result<Option<PeriodRow>, StoreError> {
        PeriodRepo::find(&self.conn, id)
    }

    pub fn source_find(&self, id: EntityId) -> Result<Option<SourceRow>, StoreError> {
        SourceRepo::find(&self.conn, id)
    }
}
