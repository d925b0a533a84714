#![forbid(unsafe_code)]

mod core;
mod geometry;
mod indexes;
mod reference;
mod shapes;

pub(super) fn full_schema_sql() -> String {
    let mut sql = String::new();
    sql.push_str(core::SQL);
    sql.push_str(reference::SQL);
    sql.push_str(geometry::SQL);
    sql.push_str(shapes::SQL);
    sql.push_str(indexes::SQL);
    sql
}
