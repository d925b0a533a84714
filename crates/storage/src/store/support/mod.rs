#![forbid(unsafe_code)]

mod json;
mod schema;
mod time;

pub(super) use json::*;
pub(super) use schema::migrate_sqlite_schema;
pub(super) use time::{now_ms, now_nanos};
