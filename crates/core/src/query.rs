#![forbid(unsafe_code)]

use crate::directive::{LonLat, MAX_LATITUDE, MAX_LONGITUDE, MIN_LATITUDE, MIN_LONGITUDE};
use crate::ids::EntityId;
use crate::normalize::InputError;
use serde::{Deserialize, Serialize};

/// Node-coordinate filter, inclusive on every edge.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn world() -> Self {
        Self {
            west: MIN_LONGITUDE,
            south: MIN_LATITUDE,
            east: MAX_LONGITUDE,
            north: MAX_LATITUDE,
        }
    }

    pub fn contains(&self, position: LonLat) -> bool {
        (self.west..=self.east).contains(&position.lon) && (self.south..=self.north).contains(&position.lat)
    }
}

/// Shape data/node query. Exactly one of `ids`, `changeset`, `period`, `year`
/// must be set; `types` and `bbox` only narrow the selection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changeset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeSelector<'q> {
    Ids(&'q [EntityId]),
    Changeset(&'q str),
    Period(EntityId),
    Year(i32),
}

impl ShapeQuery {
    pub fn by_ids(ids: impl Into<Vec<EntityId>>) -> Self {
        Self {
            ids: Some(ids.into()),
            ..Self::default()
        }
    }

    pub fn by_changeset(changeset: impl Into<String>) -> Self {
        Self {
            changeset: Some(changeset.into()),
            ..Self::default()
        }
    }

    pub fn by_period(period: EntityId) -> Self {
        Self {
            period: Some(period),
            ..Self::default()
        }
    }

    pub fn by_year(year: i32) -> Self {
        Self {
            year: Some(year),
            ..Self::default()
        }
    }

    pub fn with_types(mut self, types: impl Into<Vec<EntityId>>) -> Self {
        self.types = Some(types.into());
        self
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Empty id lists and blank changeset ids count as absent.
    pub fn selector(&self) -> Result<ShapeSelector<'_>, InputError> {
        let mut found = Vec::with_capacity(1);
        if let Some(ids) = self.ids.as_deref().filter(|ids| !ids.is_empty()) {
            found.push(ShapeSelector::Ids(ids));
        }
        if let Some(changeset) = self.changeset.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            found.push(ShapeSelector::Changeset(changeset));
        }
        if let Some(period) = self.period {
            found.push(ShapeSelector::Period(period));
        }
        if let Some(year) = self.year {
            found.push(ShapeSelector::Year(year));
        }
        match found.as_slice() {
            [one] => Ok(*one),
            _ => Err(InputError::MissingSelector),
        }
    }

    pub fn type_filter(&self) -> Option<&[EntityId]> {
        self.types.as_deref().filter(|types| !types.is_empty())
    }
}
