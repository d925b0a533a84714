#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        CREATE TABLE IF NOT EXISTS layers (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          name TEXT NOT NULL,
          short_name TEXT NOT NULL,
          level INTEGER,
          color1 TEXT NOT NULL DEFAULT '',
          color2 TEXT NOT NULL DEFAULT '',
          data TEXT NOT NULL DEFAULT '{}',
          changeset_id TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS types (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          name TEXT NOT NULL,
          layer_id INTEGER,
          data TEXT NOT NULL DEFAULT '{}',
          changeset_id TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          FOREIGN KEY (layer_id) REFERENCES layers(id)
        );

        CREATE TABLE IF NOT EXISTS periods (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          name TEXT NOT NULL,
          start_year INTEGER,
          end_year INTEGER,
          data TEXT NOT NULL DEFAULT '{}',
          changeset_id TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          CHECK (start_year IS NULL OR end_year IS NULL OR start_year <= end_year)
        );

        CREATE TABLE IF NOT EXISTS sources (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          name TEXT NOT NULL,
          source TEXT,
          data TEXT NOT NULL DEFAULT '{}',
          changeset_id TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );
"#;
