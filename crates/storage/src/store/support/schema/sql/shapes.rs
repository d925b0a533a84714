#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        CREATE TABLE IF NOT EXISTS shapes (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          type_id INTEGER,
          start_year INTEGER,
          start_month INTEGER,
          start_day INTEGER,
          end_year INTEGER,
          end_month INTEGER,
          end_day INTEGER,
          data TEXT NOT NULL DEFAULT '{}',
          changeset_id TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          FOREIGN KEY (type_id) REFERENCES types(id)
        );

        CREATE TABLE IF NOT EXISTS shape_periods (
          shape_id INTEGER NOT NULL,
          period_id INTEGER NOT NULL,
          PRIMARY KEY (shape_id, period_id),
          FOREIGN KEY (shape_id) REFERENCES shapes(id) ON DELETE CASCADE,
          FOREIGN KEY (period_id) REFERENCES periods(id)
        );

        CREATE TABLE IF NOT EXISTS shape_tags (
          shape_id INTEGER NOT NULL,
          type_id INTEGER NOT NULL,
          PRIMARY KEY (shape_id, type_id),
          FOREIGN KEY (shape_id) REFERENCES shapes(id) ON DELETE CASCADE,
          FOREIGN KEY (type_id) REFERENCES types(id)
        );

        -- relation_id points into nodes, ways or shapes depending on relation_type.
        CREATE TABLE IF NOT EXISTS shape_relations (
          shape_id INTEGER NOT NULL,
          relation_type TEXT NOT NULL CHECK (relation_type IN ('Node', 'Way', 'Shape')),
          relation_id INTEGER NOT NULL,
          relation_role TEXT NOT NULL,
          sequence_id INTEGER NOT NULL,
          PRIMARY KEY (shape_id, sequence_id),
          FOREIGN KEY (shape_id) REFERENCES shapes(id) ON DELETE CASCADE
        );
"#;
