#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        CREATE INDEX IF NOT EXISTS idx_way_nodes_node ON way_nodes(node_id);
        CREATE INDEX IF NOT EXISTS idx_shape_relations_target
          ON shape_relations(relation_type, relation_id);
        CREATE INDEX IF NOT EXISTS idx_shape_periods_period ON shape_periods(period_id);
        CREATE INDEX IF NOT EXISTS idx_shapes_changeset ON shapes(changeset_id);
        CREATE INDEX IF NOT EXISTS idx_shapes_years ON shapes(start_year, end_year);
        CREATE INDEX IF NOT EXISTS idx_types_layer ON types(layer_id);
"#;
