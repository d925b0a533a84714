#![forbid(unsafe_code)]

//! Per-kind persistence behind the diff executor.

use super::StoreError;
use cm_core::{Action, EntityId, ObjectKind, Payload};
use rusqlite::{Connection, OptionalExtension, params};

/// Write context shared by every directive of one batch.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ApplyContext<'a> {
    pub changeset_id: Option<&'a str>,
    pub now_ms: i64,
}

/// All methods take a `Connection` so they run unchanged inside a
/// transaction or a savepoint.
pub(crate) trait EntityRepo {
    const KIND: ObjectKind;
    const TABLE: &'static str;
    type Payload;
    type Row;

    fn payload(payload: &Payload) -> Option<&Self::Payload>;

    /// Checks that need stored state. Returned reasons reject the directive.
    fn validate(
        _conn: &Connection,
        _action: Action,
        _id: Option<EntityId>,
        _payload: &Self::Payload,
    ) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }

    fn create(conn: &Connection, cx: &ApplyContext<'_>, payload: &Self::Payload) -> Result<EntityId, StoreError>;

    fn update(
        conn: &Connection,
        cx: &ApplyContext<'_>,
        id: EntityId,
        payload: &Self::Payload,
    ) -> Result<(), StoreError>;

    /// `detach` names member sequences to drop while keeping the entity.
    fn delete(
        conn: &Connection,
        cx: &ApplyContext<'_>,
        id: EntityId,
        detach: Option<&[u32]>,
    ) -> Result<(), StoreError>;

    fn find(conn: &Connection, id: EntityId) -> Result<Option<Self::Row>, StoreError>;

    fn exists(conn: &Connection, id: EntityId) -> Result<bool, StoreError> {
        exists_tx(conn, Self::TABLE, id)
    }

    fn ensure_exists(conn: &Connection, id: EntityId) -> Result<(), StoreError> {
        if Self::exists(conn, id)? {
            Ok(())
        } else {
            Err(StoreError::UnknownId {
                kind: Self::KIND,
                id,
            })
        }
    }
}

pub(crate) fn exists_tx(conn: &Connection, table: &str, id: EntityId) -> Result<bool, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT 1 FROM {table} WHERE id = ?1"),
            params![id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

/// Ids from `ids` that have no row in `table`, in input order.
pub(crate) fn missing_ids_tx(
    conn: &Connection,
    table: &str,
    ids: &[EntityId],
) -> Result<Vec<EntityId>, StoreError> {
    let mut missing = Vec::new();
    for &id in ids {
        if !missing.contains(&id) && !exists_tx(conn, table, id)? {
            missing.push(id);
        }
    }
    Ok(missing)
}

/// Runs one add/edit/delete against repository `R`, returning the entity id.
pub(crate) fn apply_with<R: EntityRepo>(
    conn: &Connection,
    cx: &ApplyContext<'_>,
    action: Action,
    existing: Option<EntityId>,
    payload: &Payload,
) -> Result<EntityId, StoreError> {
    if let Some(id) = existing {
        R::ensure_exists(conn, id)?;
    }
    match (action, existing, payload) {
        (Action::Delete, Some(id), Payload::Delete { detach }) => {
            R::delete(conn, cx, id, detach.as_deref())?;
            Ok(id)
        }
        (Action::Add, None, payload) | (Action::Edit, Some(_), payload) => {
            let typed = R::payload(payload)
                .ok_or(StoreError::InvalidInput("payload does not match object kind"))?;
            let reasons = R::validate(conn, action, existing, typed)?;
            if !reasons.is_empty() {
                return Err(StoreError::Rejected(reasons.join("; ")));
            }
            match existing {
                Some(id) => {
                    R::update(conn, cx, id, typed)?;
                    Ok(id)
                }
                None => R::create(conn, cx, typed),
            }
        }
        _ => Err(StoreError::InvalidInput("action does not match target")),
    }
}
