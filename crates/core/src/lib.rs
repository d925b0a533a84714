#![forbid(unsafe_code)]

pub mod attributes;
pub mod directive;
pub mod geometry;
pub mod ids;
pub mod normalize;
pub mod query;
pub mod resolver;

pub use attributes::{AttrValue, AttributeMap, AttributePatch};
pub use directive::*;
pub use ids::*;
pub use normalize::{DirectiveIssue, InputError, Normalized, Normalizer, ensure_batch};
pub use geometry::{GeometryPart, Polygon, ShapeGeometry, ShapeNodeRow, assemble};
pub use query::{BoundingBox, ShapeQuery, ShapeSelector};
pub use resolver::{IdResolver, ResolveError};

#[cfg(test)]
mod tests;
