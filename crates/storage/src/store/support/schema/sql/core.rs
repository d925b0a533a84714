#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        CREATE TABLE IF NOT EXISTS meta (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        -- One row per submitted changeset; resubmission replaces the directive list.
        CREATE TABLE IF NOT EXISTS changesets (
          id TEXT PRIMARY KEY,
          batch_mode TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        -- Audit form of each directive with references rewritten to real ids.
        CREATE TABLE IF NOT EXISTS changeset_directives (
          changeset_id TEXT NOT NULL,
          position INTEGER NOT NULL,
          action TEXT,
          object TEXT,
          object_id TEXT,
          state TEXT NOT NULL,
          record_json TEXT NOT NULL,
          PRIMARY KEY (changeset_id, position),
          FOREIGN KEY (changeset_id) REFERENCES changesets(id) ON DELETE CASCADE
        );
"#;
