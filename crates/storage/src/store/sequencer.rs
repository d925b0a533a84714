#![forbid(unsafe_code)]

//! Gapless ordering of shape relations and way nodes.
//!
//! Every owner's members carry `sequence_id` values `0..n-1`. Renumbering first
//! moves the surviving rows to negative staging values drawn from a monotonic
//! counter, then assigns final positions, so the `(owner, sequence_id)` key never
//! collides mid-update.

use super::{SequencerError, StoreError};
use cm_core::{EntityId, RelationRole, RelationType, RelationSpec};
use rusqlite::{Connection, params};
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OrderedTable {
    ShapeRelations,
    WayNodes,
}

impl OrderedTable {
    fn table(self) -> &'static str {
        match self {
            OrderedTable::ShapeRelations => "shape_relations",
            OrderedTable::WayNodes => "way_nodes",
        }
    }

    fn owner_column(self) -> &'static str {
        match self {
            OrderedTable::ShapeRelations => "shape_id",
            OrderedTable::WayNodes => "way_id",
        }
    }
}

/// A member row to insert, without its final sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Member {
    WayNode {
        node_id: EntityId,
    },
    Relation {
        relation_type: RelationType,
        relation_id: EntityId,
        role: RelationRole,
    },
}

impl Member {
    pub(crate) fn relation(spec: &RelationSpec) -> Self {
        Member::Relation {
            relation_type: spec.relation_type,
            relation_id: spec.target,
            role: spec.role,
        }
    }

    fn describe(&self) -> String {
        match self {
            Member::WayNode { node_id } => format!("Node {node_id}"),
            Member::Relation {
                relation_type,
                relation_id,
                role,
            } => format!("{relation_type} {relation_id} ({role})"),
        }
    }

    fn target_table(&self) -> &'static str {
        match self {
            Member::WayNode { .. } => "nodes",
            Member::Relation { relation_type, .. } => match relation_type {
                RelationType::Node => "nodes",
                RelationType::Way => "ways",
                RelationType::Shape => "shapes",
            },
        }
    }

    fn target_id(&self) -> EntityId {
        match self {
            Member::WayNode { node_id } => *node_id,
            Member::Relation { relation_id, .. } => *relation_id,
        }
    }
}

enum Slot {
    Existing(i64),
    New(Member),
}

/// Ordered members of one owner (a shape or a way).
pub(crate) struct Sequencer<'c> {
    conn: &'c Connection,
    table: OrderedTable,
    owner: EntityId,
}

impl<'c> Sequencer<'c> {
    pub(crate) fn new(conn: &'c Connection, table: OrderedTable, owner: EntityId) -> Self {
        Self { conn, table, owner }
    }

    pub(crate) fn shape(conn: &'c Connection, shape_id: EntityId) -> Self {
        Self::new(conn, OrderedTable::ShapeRelations, shape_id)
    }

    pub(crate) fn way(conn: &'c Connection, way_id: EntityId) -> Self {
        Self::new(conn, OrderedTable::WayNodes, way_id)
    }

    /// Bulk attach ordered by the given sequences; missing sequences default
    /// to the entry's list position.
    pub(crate) fn attach(&self, entries: &[(Option<u32>, Member)]) -> Result<usize, StoreError> {
        if entries.is_empty() {
            return Err(SequencerError::NoRelations.into());
        }
        let mut ordered: Vec<(u32, Member)> = entries
            .iter()
            .enumerate()
            .map(|(i, (seq, member))| (seq.unwrap_or(u32::try_from(i).unwrap_or(u32::MAX)), *member))
            .collect();
        self.check(&ordered)?;
        ordered.sort_by_key(|(seq, _)| *seq);

        let mut slots = self.existing_slots()?;
        slots.extend(ordered.into_iter().map(|(_, member)| Slot::New(member)));
        self.write(slots)?;
        Ok(entries.len())
    }

    /// Positional insert: each entry lands at its sequence, shifting later
    /// members; absent or out-of-range sequences append.
    pub(crate) fn insert(&self, entries: &[(Option<u32>, Member)]) -> Result<usize, StoreError> {
        if entries.is_empty() {
            return Err(SequencerError::NoRelations.into());
        }
        let explicit: Vec<(u32, Member)> = entries
            .iter()
            .filter_map(|(seq, member)| seq.map(|seq| (seq, *member)))
            .collect();
        self.check(&explicit)?;
        let unsequenced: Vec<(u32, Member)> = entries
            .iter()
            .filter(|(seq, _)| seq.is_none())
            .map(|(_, member)| (u32::MAX, *member))
            .collect();
        self.check_targets(&unsequenced)?;

        // Explicit sequences in ascending order, then unsequenced members.
        let mut ordered = explicit;
        ordered.sort_by_key(|(seq, _)| *seq);
        let mut slots = self.existing_slots()?;
        for (seq, member) in ordered.into_iter().chain(unsequenced) {
            match usize::try_from(seq).ok().filter(|at| *at <= slots.len()) {
                Some(at) => slots.insert(at, Slot::New(member)),
                None => slots.push(Slot::New(member)),
            }
        }
        self.write(slots)?;
        Ok(entries.len())
    }

    /// Removes the named sequences and renumbers the survivors in order.
    pub(crate) fn detach(&self, sequences: &[u32]) -> Result<usize, StoreError> {
        let present = self.sequences()?;
        if let Some(&sequence) = sequences.iter().find(|seq| !present.contains(seq)) {
            return Err(SequencerError::UnknownSequence { sequence }.into());
        }
        let mut removed = 0;
        for sequence in sequences.iter().collect::<BTreeSet<_>>() {
            removed += self.conn.execute(
                &format!(
                    "DELETE FROM {} WHERE {} = ?1 AND sequence_id = ?2",
                    self.table.table(),
                    self.table.owner_column()
                ),
                params![self.owner, sequence],
            )?;
        }
        self.resequence()?;
        Ok(removed)
    }

    /// Drops every member of the owner.
    pub(crate) fn clear(&self) -> Result<usize, StoreError> {
        Ok(self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1",
                self.table.table(),
                self.table.owner_column()
            ),
            params![self.owner],
        )?)
    }

    /// Closes gaps left by deletes; order is preserved.
    pub(crate) fn resequence(&self) -> Result<usize, StoreError> {
        let slots = self.existing_slots()?;
        let count = slots.len();
        self.write(slots)?;
        Ok(count)
    }

    pub(crate) fn sequences(&self) -> Result<Vec<u32>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT sequence_id FROM {} WHERE {} = ?1 ORDER BY sequence_id",
            self.table.table(),
            self.table.owner_column()
        ))?;
        let rows = stmt.query_map(params![self.owner], |row| row.get::<_, u32>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn existing_slots(&self) -> Result<Vec<Slot>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT rowid FROM {} WHERE {} = ?1 ORDER BY sequence_id",
            self.table.table(),
            self.table.owner_column()
        ))?;
        let rows = stmt.query_map(params![self.owner], |row| row.get::<_, i64>(0))?;
        let mut slots = Vec::new();
        for rowid in rows {
            slots.push(Slot::Existing(rowid?));
        }
        Ok(slots)
    }

    fn write(&self, slots: Vec<Slot>) -> Result<(), StoreError> {
        let table = self.table.table();
        let mut staging: i64 = 0;
        for slot in &slots {
            if let Slot::Existing(rowid) = slot {
                staging -= 1;
                self.conn.execute(
                    &format!("UPDATE {table} SET sequence_id = ?1 WHERE rowid = ?2"),
                    params![staging, rowid],
                )?;
            }
        }
        for (position, slot) in slots.into_iter().enumerate() {
            let sequence = i64::try_from(position)
                .map_err(|_| StoreError::InvalidInput("sequence overflow"))?;
            match slot {
                Slot::Existing(rowid) => {
                    self.conn.execute(
                        &format!("UPDATE {table} SET sequence_id = ?1 WHERE rowid = ?2"),
                        params![sequence, rowid],
                    )?;
                }
                Slot::New(member) => self.insert_row(member, sequence)?,
            }
        }
        Ok(())
    }

    fn insert_row(&self, member: Member, sequence: i64) -> Result<(), StoreError> {
        match (self.table, member) {
            (OrderedTable::WayNodes, Member::WayNode { node_id }) => {
                self.conn.execute(
                    "INSERT INTO way_nodes(way_id, node_id, sequence_id) VALUES (?1, ?2, ?3)",
                    params![self.owner, node_id, sequence],
                )?;
            }
            (
                OrderedTable::ShapeRelations,
                Member::Relation {
                    relation_type,
                    relation_id,
                    role,
                },
            ) => {
                self.conn.execute(
                    "INSERT INTO shape_relations(shape_id, relation_type, relation_id, relation_role, sequence_id) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        self.owner,
                        relation_type.as_str(),
                        relation_id,
                        role.as_str(),
                        sequence
                    ],
                )?;
            }
            _ => return Err(StoreError::InvalidInput("member does not fit this table")),
        }
        Ok(())
    }

    /// Duplicate sequences, unknown targets and self references, all reported.
    fn check(&self, entries: &[(u32, Member)]) -> Result<(), StoreError> {
        let mut problems = Vec::new();
        let mut seen = BTreeSet::new();
        for (seq, member) in entries {
            if !seen.insert(*seq) {
                problems.push(format!("sequence {seq} appears twice ({})", member.describe()));
            }
        }
        problems.extend(self.target_problems(entries)?);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SequencerError::InvalidRelation { entries: problems }.into())
        }
    }

    fn check_targets(&self, entries: &[(u32, Member)]) -> Result<(), StoreError> {
        let problems = self.target_problems(entries)?;
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SequencerError::InvalidRelation { entries: problems }.into())
        }
    }

    fn target_problems(&self, entries: &[(u32, Member)]) -> Result<Vec<String>, StoreError> {
        let mut problems = Vec::new();
        for (_, member) in entries {
            if let Member::Relation {
                relation_type: RelationType::Shape,
                relation_id,
                ..
            } = member
                && *relation_id == self.owner
                && self.table == OrderedTable::ShapeRelations
            {
                problems.push(format!("shape {relation_id} cannot relate to itself"));
                continue;
            }
            if !super::repo::exists_tx(self.conn, member.target_table(), member.target_id())? {
                problems.push(format!("{} does not exist", member.describe()));
            }
        }
        Ok(problems)
    }
}

/// What a cascade removes from member lists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MemberTarget {
    /// Memberships of a node in ways.
    WayNode(EntityId),
    /// Shape relations pointing at a node, way or shape.
    Relation(RelationType, EntityId),
}

fn id_column(row: &rusqlite::Row<'_>) -> rusqlite::Result<i64> {
    row.get(0)
}

/// Owners whose member list references `target`, in id order.
pub(crate) fn owners_referencing_tx(
    conn: &Connection,
    target: MemberTarget,
) -> Result<Vec<EntityId>, StoreError> {
    let owners = match target {
        MemberTarget::WayNode(node_id) => {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT way_id FROM way_nodes WHERE node_id = ?1 ORDER BY way_id",
            )?;
            let rows = stmt.query_map(params![node_id], id_column)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
        MemberTarget::Relation(relation_type, relation_id) => {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT shape_id FROM shape_relations \
                 WHERE relation_type = ?1 AND relation_id = ?2 ORDER BY shape_id",
            )?;
            let rows = stmt.query_map(params![relation_type.as_str(), relation_id], id_column)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
    };
    Ok(owners)
}

/// Removes every member row pointing at `target` and closes the gaps.
/// Returns the number of owners touched.
pub(crate) fn remove_references_tx(conn: &Connection, target: MemberTarget) -> Result<usize, StoreError> {
    let owners = owners_referencing_tx(conn, target)?;
    for &owner in &owners {
        let table = match target {
            MemberTarget::WayNode(node_id) => {
                conn.execute(
                    "DELETE FROM way_nodes WHERE way_id = ?1 AND node_id = ?2",
                    params![owner, node_id],
                )?;
                OrderedTable::WayNodes
            }
            MemberTarget::Relation(relation_type, relation_id) => {
                conn.execute(
                    "DELETE FROM shape_relations \
                     WHERE shape_id = ?1 AND relation_type = ?2 AND relation_id = ?3",
                    params![owner, relation_type.as_str(), relation_id],
                )?;
                OrderedTable::ShapeRelations
            }
        };
        Sequencer::new(conn, table, owner).resequence()?;
    }
    Ok(owners.len())
}
