#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        CREATE TABLE IF NOT EXISTS nodes (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          longitude REAL NOT NULL CHECK (longitude BETWEEN -180 AND 180),
          latitude REAL NOT NULL CHECK (latitude BETWEEN -90 AND 90),
          data TEXT NOT NULL DEFAULT '{}',
          changeset_id TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ways (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          data TEXT NOT NULL DEFAULT '{}',
          changeset_id TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        -- Gapless 0..n-1 per way; negative values only exist mid-resequence.
        CREATE TABLE IF NOT EXISTS way_nodes (
          way_id INTEGER NOT NULL,
          node_id INTEGER NOT NULL,
          sequence_id INTEGER NOT NULL,
          PRIMARY KEY (way_id, sequence_id),
          FOREIGN KEY (way_id) REFERENCES ways(id) ON DELETE CASCADE,
          FOREIGN KEY (node_id) REFERENCES nodes(id)
        );
"#;
