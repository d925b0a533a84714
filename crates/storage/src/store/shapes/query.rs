#![forbid(unsafe_code)]

use super::super::repo::EntityRepo;
use super::super::{ShapeDetail, ShapeRow, SqliteStore, StoreError};
use super::{SHAPE_COLUMNS, SetTable, ShapeRepo, set_members_tx, shape_relations_tx, shape_row};
use cm_core::{
    BoundingBox, DirectiveState, EntityId, ObjectKind, RelationRole, ShapeGeometry, ShapeNodeRow,
    ShapeQuery, ShapeSelector, assemble,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};

/// Every node reached from a shape: through a way relation (one row per way
/// member) or a direct node relation (`seq2 = 0`). Nested shapes add nothing.
const MEMBER_NODES: &str = "\
    SELECT r.shape_id AS shape, r.relation_id AS way, n.id AS node, r.relation_role AS role, \
           n.latitude AS lat, n.longitude AS lon, r.sequence_id AS seq1, wn.sequence_id AS seq2 \
    FROM shape_relations r \
    JOIN way_nodes wn ON wn.way_id = r.relation_id \
    JOIN nodes n ON n.id = wn.node_id \
    WHERE r.relation_type = 'Way' \
    UNION ALL \
    SELECT r.shape_id, NULL, n.id, r.relation_role, n.latitude, n.longitude, r.sequence_id, 0 \
    FROM shape_relations r \
    JOIN nodes n ON n.id = r.relation_id \
    WHERE r.relation_type = 'Node'";

/// A `WHERE` clause over `shapes s` plus its positional parameters.
struct ShapeFilter {
    clause: String,
    params: Vec<SqlValue>,
}

impl ShapeFilter {
    fn build(query: &ShapeQuery, with_bbox: bool) -> Result<Self, StoreError> {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        match query.selector()? {
            ShapeSelector::Ids(ids) => {
                clauses.push(format!("s.id IN ({})", placeholders(ids.len())));
                params.extend(ids.iter().map(|id| SqlValue::Integer(*id)));
            }
            ShapeSelector::Changeset(changeset) => {
                clauses.push(format!(
                    "s.id IN (SELECT CAST(d.object_id AS INTEGER) FROM changeset_directives d \
                     WHERE d.changeset_id = ? AND d.object = '{}' AND d.object_id IS NOT NULL \
                     AND d.state IN ('{}', '{}'))",
                    ObjectKind::Shape.as_str(),
                    DirectiveState::Applied.as_str(),
                    DirectiveState::Recorded.as_str()
                ));
                params.push(SqlValue::Text(changeset.to_string()));
            }
            ShapeSelector::Period(period) => {
                clauses.push(
                    "EXISTS (SELECT 1 FROM shape_periods sp WHERE sp.shape_id = s.id AND sp.period_id = ?)"
                        .to_string(),
                );
                params.push(SqlValue::Integer(period));
            }
            ShapeSelector::Year(year) => {
                clauses.push(
                    "(s.start_year IS NULL OR s.start_year <= ?) AND (s.end_year IS NULL OR s.end_year >= ?)"
                        .to_string(),
                );
                params.push(SqlValue::Integer(i64::from(year)));
                params.push(SqlValue::Integer(i64::from(year)));
            }
        }
        if let Some(types) = query.type_filter() {
            clauses.push(format!("s.type_id IN ({})", placeholders(types.len())));
            params.extend(types.iter().map(|id| SqlValue::Integer(*id)));
        }
        if with_bbox && let Some(bbox) = query.bbox {
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM ({MEMBER_NODES}) m WHERE m.shape = s.id AND {})",
                bbox_clause("m")
            ));
            params.extend(bbox_params(&bbox));
        }
        Ok(Self {
            clause: clauses.join(" AND "),
            params,
        })
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn bbox_clause(alias: &str) -> String {
    format!("{alias}.lat <= ? AND {alias}.lat >= ? AND {alias}.lon >= ? AND {alias}.lon <= ?")
}

fn bbox_params(bbox: &BoundingBox) -> [SqlValue; 4] {
    [
        SqlValue::Real(bbox.north),
        SqlValue::Real(bbox.south),
        SqlValue::Real(bbox.west),
        SqlValue::Real(bbox.east),
    ]
}

fn shape_data_tx(conn: &Connection, query: &ShapeQuery) -> Result<Vec<ShapeRow>, StoreError> {
    let filter = ShapeFilter::build(query, true)?;
    let mut stmt = conn.prepare(&format!("{SHAPE_COLUMNS} WHERE {} ORDER BY s.id", filter.clause))?;
    let rows = stmt.query_map(params_from_iter(filter.params.iter()), shape_row)?;
    let mut shapes = rows.collect::<Result<Vec<_>, _>>()?;
    for shape in &mut shapes {
        shape.periods = set_members_tx(conn, SetTable::Periods, shape.id)?;
        shape.tags = set_members_tx(conn, SetTable::Tags, shape.id)?;
    }
    Ok(shapes)
}

/// Member node rows ordered by shape, relation sequence, then way sequence.
fn shape_nodes_tx(conn: &Connection, query: &ShapeQuery) -> Result<Vec<ShapeNodeRow>, StoreError> {
    let filter = ShapeFilter::build(query, false)?;
    let mut params = filter.params;
    let bbox = match query.bbox {
        Some(bbox) => {
            params.extend(bbox_params(&bbox));
            format!("WHERE {}", bbox_clause("m"))
        }
        None => String::new(),
    };
    let sql = format!(
        "WITH selected(id) AS (SELECT s.id FROM shapes s WHERE {}), \
              members AS ({MEMBER_NODES}) \
         SELECT m.shape, m.way, m.node, m.role, m.lat, m.lon, m.seq1, m.seq2 \
         FROM members m JOIN selected sel ON sel.id = m.shape \
         {bbox} \
         ORDER BY m.shape, m.seq1, m.seq2",
        filter.clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let role: String = row.get(3)?;
        out.push(ShapeNodeRow {
            shape: row.get(0)?,
            way: row.get(1)?,
            node: row.get(2)?,
            role: RelationRole::parse(&role).ok_or(StoreError::InvalidInput("unknown relation role in store"))?,
            lat: row.get(4)?,
            lon: row.get(5)?,
            seq1: row.get(6)?,
            seq2: row.get(7)?,
        });
    }
    Ok(out)
}

impl SqliteStore {
    /// Shape properties for the selected shapes, by id.
    pub fn shape_data(&self, query: &ShapeQuery) -> Result<Vec<ShapeRow>, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let shapes = shape_data_tx(&tx, query)?;
        tx.commit()?;
        Ok(shapes)
    }

    pub fn shape_nodes(&self, query: &ShapeQuery) -> Result<Vec<ShapeNodeRow>, StoreError> {
        shape_nodes_tx(&self.conn, query)
    }

    /// Rings, paths and markers rebuilt from [`SqliteStore::shape_nodes`].
    pub fn shape_geometry(&self, query: &ShapeQuery) -> Result<Vec<ShapeGeometry>, StoreError> {
        Ok(assemble(&self.shape_nodes(query)?))
    }

    /// One shape with its ordered relation objects.
    pub fn shape_get(&self, id: EntityId) -> Result<Option<ShapeDetail>, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let detail = match ShapeRepo::find(&tx, id)? {
            Some(shape) => Some(ShapeDetail {
                objects: shape_relations_tx(&tx, id)?,
                shape,
            }),
            None => None,
        };
        tx.commit()?;
        Ok(detail)
    }
}
