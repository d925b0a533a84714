#![forbid(unsafe_code)]

//! Changesets: the stored directive list of the latest submission per id.

use super::diff::{BatchRun, record_only, run_batch};
use super::support::{now_ms, now_nanos};
use super::{Changeset, ChangesetReceipt, SqliteStore, StoreError, SubmitChangesetRequest};
use crate::BatchMode;
use cm_core::{Action, ChangesetId, DirectiveRecord, DirectiveState, ObjectKind, ensure_batch};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use sha2::Digest as _;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, instrument};

static CHANGESET_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 32 hex chars from the clock, the process id and a process-wide counter.
fn generate_changeset_id() -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(now_nanos().to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(CHANGESET_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in &digest[..16] {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

fn changeset_exists_tx(conn: &Connection, id: &str) -> Result<bool, StoreError> {
    Ok(conn
        .query_row("SELECT 1 FROM changesets WHERE id = ?1", params![id], |row| {
            row.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

/// Canonical spelling when the wire value parses, the raw text otherwise.
fn column_text<T>(raw: Option<&str>, parse: impl Fn(&str) -> Option<T>, show: impl Fn(T) -> &'static str) -> Option<String> {
    raw.map(|raw| parse(raw).map_or_else(|| raw.to_string(), |value| show(value).to_string()))
}

/// Inserts the changeset or replaces its directive list.
fn write_changeset_tx(
    conn: &Connection,
    id: &str,
    mode: BatchMode,
    records: &[DirectiveRecord],
    now_ms: i64,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO changesets(id, batch_mode, created_at_ms, updated_at_ms) VALUES (?1, ?2, ?3, ?3) \
         ON CONFLICT(id) DO UPDATE SET batch_mode = excluded.batch_mode, updated_at_ms = excluded.updated_at_ms",
        params![id, mode.as_str(), now_ms],
    )?;
    conn.execute("DELETE FROM changeset_directives WHERE changeset_id = ?1", params![id])?;
    let mut stmt = conn.prepare(
        "INSERT INTO changeset_directives(changeset_id, position, action, object, object_id, state, record_json) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for (position, record) in records.iter().enumerate() {
        let position = i64::try_from(position).map_err(|_| StoreError::InvalidInput("too many directives"))?;
        let state = record.state.unwrap_or(DirectiveState::Recorded);
        stmt.execute(params![
            id,
            position,
            column_text(record.directive.action_text(), Action::parse, Action::as_str),
            column_text(record.directive.object_text(), ObjectKind::parse, ObjectKind::as_str),
            record.object_id_text(),
            state.as_str(),
            serde_json::to_string(record)?
        ])?;
    }
    Ok(())
}

fn load_changeset_tx(conn: &Connection, id: &str) -> Result<Option<Changeset>, StoreError> {
    let head = conn
        .query_row(
            "SELECT batch_mode, created_at_ms, updated_at_ms FROM changesets WHERE id = ?1",
            params![id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
        )
        .optional()?;
    let Some((batch_mode, created_at_ms, updated_at_ms)) = head else {
        return Ok(None);
    };
    let mut stmt = conn.prepare(
        "SELECT record_json FROM changeset_directives WHERE changeset_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;
    let mut directives = Vec::new();
    for raw in rows {
        directives.push(serde_json::from_str::<DirectiveRecord>(&raw?)?);
    }
    Ok(Some(Changeset {
        id: id.to_string(),
        batch_mode,
        created_at_ms,
        updated_at_ms,
        directives,
    }))
}

impl SqliteStore {
    /// Applies a batch under a new changeset, or replaces the audit list of an
    /// existing one without touching entities.
    #[instrument(skip(self, request), fields(directives = request.directives.as_ref().map_or(0, Vec::len)))]
    pub fn changeset_submit(&mut self, request: SubmitChangesetRequest) -> Result<ChangesetReceipt, StoreError> {
        let specs = ensure_batch(request.directives.as_deref())?;
        let id = match request.id.as_deref() {
            Some(id) => ChangesetId::try_new(id.trim())?.into_string(),
            None => generate_changeset_id(),
        };
        let mode = self.config.batch_mode;
        let replaced = changeset_exists_tx(&self.conn, &id)?;
        let run: BatchRun = if replaced {
            record_only(specs)
        } else {
            run_batch(&mut self.conn, &id, specs, mode, now_ms())?
        };

        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        write_changeset_tx(&tx, &id, mode, &run.records, now_ms())?;
        tx.commit()?;
        info!(changeset = %id, replaced, directives = run.records.len(), "changeset written");

        Ok(ChangesetReceipt {
            id,
            replaced,
            outcomes: run.outcomes,
        })
    }

    pub fn changeset_get(&self, id: &str) -> Result<Option<Changeset>, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let changeset = load_changeset_tx(&tx, id.trim())?;
        tx.commit()?;
        Ok(changeset)
    }
}
