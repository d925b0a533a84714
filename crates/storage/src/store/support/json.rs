#![forbid(unsafe_code)]

use super::super::StoreError;
use cm_core::{AttributeMap, AttributePatch};
use rusqlite::{Connection, OptionalExtension, params};

/// Stored attribute map of one row, empty when the row or the column is missing.
pub(in crate::store) fn load_attributes_tx(
    conn: &Connection,
    table: &str,
    id: i64,
) -> Result<AttributeMap, StoreError> {
    let raw = conn
        .query_row(
            &format!("SELECT data FROM {table} WHERE id = ?1"),
            params![id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?
        .flatten();
    Ok(match raw {
        Some(raw) => AttributeMap::from_json_str(&raw)?,
        None => AttributeMap::new(),
    })
}

/// Write-time merge: patch keys overwrite, removals drop keys.
pub(in crate::store) fn merged_attributes_json(
    conn: &Connection,
    table: &str,
    id: i64,
    patch: &AttributePatch,
) -> Result<Option<String>, StoreError> {
    if patch.is_empty() {
        return Ok(None);
    }
    let mut current = load_attributes_tx(conn, table, id)?;
    current.apply(patch);
    Ok(Some(current.to_json_string()?))
}

pub(in crate::store) fn parse_attributes(raw: Option<String>) -> rusqlite::Result<AttributeMap> {
    AttributeMap::from_json_str(raw.as_deref().unwrap_or_default()).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
    })
}
