#![forbid(unsafe_code)]

//! Rebuilds per-shape geometry from ordered node rows.

use crate::directive::{LonLat, RelationRole};
use crate::ids::EntityId;
use serde::{Deserialize, Serialize};

/// One member node of a shape, as produced by the shape node query.
///
/// `seq1` is the relation sequence inside the shape, `seq2` the node sequence
/// inside the way (`0` for direct node relations).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapeNodeRow {
    pub shape: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub way: Option<EntityId>,
    pub node: EntityId,
    pub role: RelationRole,
    pub lat: f64,
    pub lon: f64,
    pub seq1: u32,
    pub seq2: u32,
}

impl ShapeNodeRow {
    pub fn position(&self) -> LonLat {
        LonLat {
            lon: self.lon,
            lat: self.lat,
        }
    }
}

pub type Ring = Vec<LonLat>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Ring,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub holes: Vec<Ring>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeometryPart {
    Polygon(Polygon),
    Path { points: Vec<LonLat> },
    Marker { role: RelationRole, position: LonLat },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapeGeometry {
    pub shape: EntityId,
    pub parts: Vec<GeometryPart>,
    /// Inner rings that appeared before any outer ring of the shape.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orphan_holes: Vec<Ring>,
}

impl ShapeGeometry {
    fn new(shape: EntityId) -> Self {
        Self {
            shape,
            parts: Vec::new(),
            orphan_holes: Vec::new(),
        }
    }

    fn push_member(&mut self, role: RelationRole, points: Vec<LonLat>) {
        match role {
            RelationRole::Outer => self.parts.push(GeometryPart::Polygon(Polygon {
                exterior: close_ring(points),
                holes: Vec::new(),
            })),
            RelationRole::Inner => {
                let ring = close_ring(points);
                let latest = self.parts.iter_mut().rev().find_map(|part| match part {
                    GeometryPart::Polygon(polygon) => Some(polygon),
                    _ => None,
                });
                match latest {
                    Some(polygon) => polygon.holes.push(ring),
                    None => self.orphan_holes.push(ring),
                }
            }
            RelationRole::Point | RelationRole::Center => {
                self.parts.extend(
                    points
                        .into_iter()
                        .map(|position| GeometryPart::Marker { role, position }),
                );
            }
            RelationRole::Line => self.parts.push(GeometryPart::Path { points }),
        }
    }
}

fn close_ring(mut points: Vec<LonLat>) -> Ring {
    if let (Some(first), Some(last)) = (points.first().copied(), points.last().copied())
        && points.len() > 1
        && first != last
    {
        points.push(first);
    }
    points
}

/// Groups rows by shape, then by relation sequence, in row order.
///
/// Rows must already be ordered by `(shape, seq1, seq2)`.
pub fn assemble(rows: &[ShapeNodeRow]) -> Vec<ShapeGeometry> {
    let mut shapes: Vec<ShapeGeometry> = Vec::new();
    let mut member: Option<(EntityId, u32, RelationRole)> = None;
    let mut points: Vec<LonLat> = Vec::new();

    for row in rows {
        let key = (row.shape, row.seq1, row.role);
        if member != Some(key) {
            if let Some((_, _, role)) = member.take()
                && let Some(current) = shapes.last_mut()
            {
                current.push_member(role, std::mem::take(&mut points));
            }
            if shapes.last().is_none_or(|current| current.shape != row.shape) {
                shapes.push(ShapeGeometry::new(row.shape));
            }
            member = Some(key);
        }
        points.push(row.position());
    }
    if let Some((_, _, role)) = member
        && let Some(current) = shapes.last_mut()
    {
        current.push_member(role, points);
    }
    shapes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(shape: EntityId, way: Option<EntityId>, role: RelationRole, seq1: u32, seq2: u32, lon: f64) -> ShapeNodeRow {
        ShapeNodeRow {
            shape,
            way,
            node: i64::from(seq1 * 10 + seq2),
            role,
            lat: lon / 2.0,
            lon,
            seq1,
            seq2,
        }
    }

    #[test]
    fn inner_ring_becomes_hole_of_latest_polygon() {
        let rows = vec![
            row(1, Some(10), RelationRole::Outer, 0, 0, 0.0),
            row(1, Some(10), RelationRole::Outer, 0, 1, 4.0),
            row(1, Some(10), RelationRole::Outer, 0, 2, 8.0),
            row(1, Some(11), RelationRole::Inner, 1, 0, 1.0),
            row(1, Some(11), RelationRole::Inner, 1, 1, 2.0),
            row(1, Some(11), RelationRole::Inner, 1, 2, 3.0),
        ];
        let shapes = assemble(&rows);
        assert_eq!(shapes.len(), 1);
        let GeometryPart::Polygon(polygon) = &shapes[0].parts[0] else {
            panic!("expected polygon");
        };
        assert_eq!(polygon.exterior.len(), 4);
        assert_eq!(polygon.exterior.first(), polygon.exterior.last());
        assert_eq!(polygon.holes.len(), 1);
        assert_eq!(polygon.holes[0][0].lon, 1.0);
    }

    #[test]
    fn markers_paths_and_orphans() {
        let rows = vec![
            row(2, Some(20), RelationRole::Inner, 0, 0, 1.0),
            row(2, Some(20), RelationRole::Inner, 0, 1, 2.0),
            row(2, None, RelationRole::Center, 1, 0, 5.0),
            row(2, Some(21), RelationRole::Line, 2, 0, 6.0),
            row(2, Some(21), RelationRole::Line, 2, 1, 7.0),
            row(3, None, RelationRole::Point, 0, 0, 9.0),
        ];
        let shapes = assemble(&rows);
        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes[0].orphan_holes.len(), 1);
        assert!(matches!(
            shapes[0].parts[0],
            GeometryPart::Marker {
                role: RelationRole::Center,
                ..
            }
        ));
        let GeometryPart::Path { points } = &shapes[0].parts[1] else {
            panic!("expected path");
        };
        assert_eq!(points.len(), 2);
        assert_eq!(shapes[1].shape, 3);
        assert_eq!(shapes[1].parts.len(), 1);
    }

    #[test]
    fn empty_rows_give_no_shapes() {
        assert!(assemble(&[]).is_empty());
    }
}
