#![forbid(unsafe_code)]

use cm_core::{
    BoundingBox, DirectiveSpec, DirectiveState, GeometryPart, InputError, RelationRole,
    RelationType, ShapeQuery,
};
use cm_storage::{ChangesetReceipt, SqliteStore, StoreError, SubmitChangesetRequest};
use serde_json::{Value, json};
use std::path::PathBuf;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("cm_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn submit(store: &mut SqliteStore, value: Value) -> ChangesetReceipt {
    let directives: Vec<DirectiveSpec> = serde_json::from_value(value).expect("directive specs");
    let receipt = store
        .changeset_submit(SubmitChangesetRequest {
            id: None,
            directives: Some(directives),
        })
        .expect("submit changeset");
    assert!(receipt.outcomes.iter().all(|o| o.is_applied()), "{:?}", receipt.outcomes);
    receipt
}

fn object_id(receipt: &ChangesetReceipt, index: usize) -> i64 {
    receipt.outcomes[index]
        .object_id
        .as_deref()
        .expect("resolved object id")
        .parse()
        .expect("numeric object id")
}

/// A square outer ring with a triangular hole.
fn square_with_hole(store: &mut SqliteStore) -> (ChangesetReceipt, i64) {
    let receipt = submit(
        store,
        json!([
            {"action": "add", "object": "node", "object_id": "n-1", "geometry": [0.0, 0.0]},
            {"action": "add", "object": "node", "object_id": "n-2", "geometry": [10.0, 0.0]},
            {"action": "add", "object": "node", "object_id": "n-3", "geometry": [10.0, 10.0]},
            {"action": "add", "object": "node", "object_id": "n-4", "geometry": [0.0, 10.0]},
            {"action": "add", "object": "node", "object_id": "n-5", "geometry": [2.0, 2.0]},
            {"action": "add", "object": "node", "object_id": "n-6", "geometry": [4.0, 2.0]},
            {"action": "add", "object": "node", "object_id": "n-7", "geometry": [3.0, 4.0]},
            {"action": "add", "object": "way", "object_id": "w-1", "way_nodes": ["n-1", "n-2", "n-3", "n-4"]},
            {"action": "add", "object": "way", "object_id": "w-2", "way_nodes": ["n-5", "n-6", "n-7"]},
            {
                "action": "add",
                "object": "shape",
                "object_id": "s-1",
                "shape_relations": ["1-Way-inner-w-2", "0-Way-outer-w-1"]
            }
        ]),
    );
    let shape = object_id(&receipt, 9);
    (receipt, shape)
}

#[test]
fn shape_nodes_list_outer_ring_before_inner_ring() {
    let storage_dir = temp_dir("outer_before_inner");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let (receipt, shape) = square_with_hole(&mut store);
    let outer_way = object_id(&receipt, 7);
    let inner_way = object_id(&receipt, 8);

    let rows = store
        .shape_nodes(&ShapeQuery::by_ids(vec![shape]))
        .expect("shape nodes");
    assert_eq!(rows.len(), 7);

    let outer: Vec<(f64, f64)> = rows[..4].iter().map(|r| (r.lon, r.lat)).collect();
    assert_eq!(outer, vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
    assert!(rows[..4].iter().all(|r| r.role == RelationRole::Outer && r.way == Some(outer_way)));
    assert_eq!(rows[..4].iter().map(|r| r.seq2).collect::<Vec<_>>(), vec![0, 1, 2, 3]);

    assert!(rows[4..].iter().all(|r| r.role == RelationRole::Inner && r.way == Some(inner_way)));
    assert!(rows.iter().all(|r| r.shape == shape));
    assert_eq!(rows[4].seq1, 1);

    let geometry = store
        .shape_geometry(&ShapeQuery::by_ids(vec![shape]))
        .expect("shape geometry");
    assert_eq!(geometry.len(), 1);
    let GeometryPart::Polygon(polygon) = &geometry[0].parts[0] else {
        panic!("expected polygon, got {:?}", geometry[0].parts);
    };
    assert_eq!(polygon.exterior.len(), 5);
    assert_eq!(polygon.holes.len(), 1);
    assert_eq!(polygon.holes[0].len(), 4);
    assert!(geometry[0].orphan_holes.is_empty());
}

#[test]
fn shape_get_lists_relation_objects_in_sequence_order() {
    let storage_dir = temp_dir("shape_get_objects");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let (receipt, shape) = square_with_hole(&mut store);

    let detail = store.shape_get(shape).expect("shape get").expect("shape exists");
    let objects: Vec<(RelationType, i64, RelationRole, u32)> = detail
        .objects
        .iter()
        .map(|o| (o.relation_type, o.id, o.role, o.sequence))
        .collect();
    assert_eq!(
        objects,
        vec![
            (RelationType::Way, object_id(&receipt, 7), RelationRole::Outer, 0),
            (RelationType::Way, object_id(&receipt, 8), RelationRole::Inner, 1),
        ]
    );
    assert!(store.shape_get(shape + 100).expect("shape get").is_none());
}

#[test]
fn query_needs_exactly_one_selector() {
    let storage_dir = temp_dir("query_selector");
    let store = SqliteStore::open(&storage_dir).expect("open store");

    let none = store
        .shape_data(&ShapeQuery::default())
        .expect_err("no selector must fail");
    assert!(matches!(none, StoreError::Input(InputError::MissingSelector)));

    let two = ShapeQuery {
        ids: Some(vec![1]),
        year: Some(1900),
        ..ShapeQuery::default()
    };
    let err = store.shape_nodes(&two).expect_err("two selectors must fail");
    assert!(matches!(err, StoreError::Input(InputError::MissingSelector)));
}

/// Three shapes on one node each: dated 1900-1950, dated 1960-1990, undated.
fn dated_shapes(store: &mut SqliteStore) -> (ChangesetReceipt, [i64; 3]) {
    let receipt = submit(
        store,
        json!([
            {"action": "add", "object": "period", "object_id": "p-1", "data": {"name": "Modern", "start_year": 1800, "end_year": 2000}},
            {"action": "add", "object": "type", "object_id": "t-1", "data": {"name": "Country"}},
            {"action": "add", "object": "type", "object_id": "t-2", "data": {"name": "City"}},
            {"action": "add", "object": "node", "object_id": "n-1", "geometry": [10.0, 50.0]},
            {"action": "add", "object": "node", "object_id": "n-2", "geometry": [100.0, -20.0]},
            {
                "action": "add",
                "object": "shape",
                "object_id": "s-1",
                "data": {"type_id": "t-1", "periods": ["p-1"], "start_year": 1900, "end_year": 1950},
                "shape_relations": ["Node-point-n-1"]
            },
            {
                "action": "add",
                "object": "shape",
                "object_id": "s-2",
                "data": {"type_id": "t-2", "periods": ["p-1"], "tags": ["t-1"], "start_year": 1960, "end_year": 1990},
                "shape_relations": ["Node-center-n-2"]
            },
            {
                "action": "add",
                "object": "shape",
                "object_id": "s-3",
                "data": {"type_id": "t-1"},
                "shape_relations": ["Node-point-n-2"]
            }
        ]),
    );
    let shapes = [object_id(&receipt, 5), object_id(&receipt, 6), object_id(&receipt, 7)];
    (receipt, shapes)
}

fn ids(rows: &[cm_storage::ShapeRow]) -> Vec<i64> {
    rows.iter().map(|row| row.id).collect()
}

#[test]
fn year_selector_treats_missing_bounds_as_open() {
    let storage_dir = temp_dir("year_selector");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let (_, [a, b, c]) = dated_shapes(&mut store);

    let in_1920 = store.shape_data(&ShapeQuery::by_year(1920)).expect("shape data");
    assert_eq!(ids(&in_1920), vec![a, c]);
    let in_1970 = store.shape_data(&ShapeQuery::by_year(1970)).expect("shape data");
    assert_eq!(ids(&in_1970), vec![b, c]);
    let in_1955 = store.shape_data(&ShapeQuery::by_year(1955)).expect("shape data");
    assert_eq!(ids(&in_1955), vec![c]);
}

#[test]
fn period_selector_narrows_by_type() {
    let storage_dir = temp_dir("period_selector");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let (receipt, [a, b, _]) = dated_shapes(&mut store);
    let period = object_id(&receipt, 0);
    let country = object_id(&receipt, 1);

    let all = store.shape_data(&ShapeQuery::by_period(period)).expect("shape data");
    assert_eq!(ids(&all), vec![a, b]);
    assert_eq!(all[0].periods, vec![period]);
    assert_eq!(all[1].tags, vec![country]);

    let countries = store
        .shape_data(&ShapeQuery::by_period(period).with_types(vec![country]))
        .expect("shape data");
    assert_eq!(ids(&countries), vec![a]);
}

#[test]
fn changeset_selector_and_bounding_box() {
    let storage_dir = temp_dir("changeset_selector");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let (receipt, [a, b, c]) = dated_shapes(&mut store);

    let all = store
        .shape_data(&ShapeQuery::by_changeset(receipt.id.clone()))
        .expect("shape data");
    assert_eq!(ids(&all), vec![a, b, c]);

    let europe = BoundingBox {
        west: 0.0,
        south: 40.0,
        east: 20.0,
        north: 60.0,
    };
    let boxed = store
        .shape_data(&ShapeQuery::by_changeset(receipt.id.clone()).with_bbox(europe))
        .expect("shape data");
    assert_eq!(ids(&boxed), vec![a]);
    let rows = store
        .shape_nodes(&ShapeQuery::by_changeset(receipt.id.clone()).with_bbox(europe))
        .expect("shape nodes");
    assert_eq!(rows.len(), 1);
    assert_eq!((rows[0].shape, rows[0].way), (a, None));

    let edit = submit(
        &mut store,
        json!([{"action": "edit", "object": "shape", "object_id": b, "data": {"end_year": 1999}}]),
    );
    let edited = store
        .shape_data(&ShapeQuery::by_changeset(edit.id))
        .expect("shape data");
    assert_eq!(ids(&edited), vec![b]);
    assert_eq!(edited[0].end.year, Some(1999));
}

#[test]
fn edit_that_inverts_the_date_range_is_skipped() {
    let storage_dir = temp_dir("inverted_dates");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let (_, [a, _, _]) = dated_shapes(&mut store);

    let receipt = store
        .changeset_submit(SubmitChangesetRequest {
            id: None,
            directives: Some(
                serde_json::from_value(json!([
                    {"action": "edit", "object": "shape", "object_id": a, "data": {"start_year": 1990}}
                ]))
                .expect("directive specs"),
            ),
        })
        .expect("submit changeset");
    assert_eq!(
        receipt.outcomes[0].reasons,
        vec!["data.end_year: start date is after end date".to_string()]
    );
    let stored = store.shape_get(a).expect("shape get").expect("shape exists");
    assert_eq!(stored.shape.start.year, Some(1900));
}

#[test]
fn null_on_a_fixed_shape_field_keeps_the_stored_value() {
    let storage_dir = temp_dir("null_fixed_field");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let (setup, [a, _, _]) = dated_shapes(&mut store);
    let country = object_id(&setup, 1);

    submit(
        &mut store,
        json!([{
            "action": "edit",
            "object": "shape",
            "object_id": a,
            "data": {"type_id": null, "start_year": null, "periods": null}
        }]),
    );
    let stored = store.shape_get(a).expect("shape get").expect("shape exists");
    assert_eq!(stored.shape.type_id, Some(country));
    assert_eq!(stored.shape.start.year, Some(1900));
    assert_eq!(stored.shape.periods.len(), 1);
    assert!(stored.shape.attributes.get("type_id").is_none());
}

#[test]
fn references_to_missing_types_layers_and_periods_are_skipped() {
    let storage_dir = temp_dir("missing_references");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let node = submit(
        &mut store,
        json!([{"action": "add", "object": "node", "geometry": [1.0, 1.0]}]),
    );
    let point = format!("Node-point-{}", object_id(&node, 0));

    let receipt = store
        .changeset_submit(SubmitChangesetRequest {
            id: None,
            directives: Some(
                serde_json::from_value(json!([
                    {"action": "add", "object": "shape", "data": {"tags": [999]}, "shape_relations": [point]},
                    {"action": "add", "object": "shape", "data": {"periods": [999]}, "shape_relations": [point]},
                    {"action": "add", "object": "shape", "data": {"type_id": 999}, "shape_relations": [point]},
                    {"action": "add", "object": "type", "data": {"name": "Province", "layer_id": 999}},
                    {"action": "add", "object": "type", "data": {"name": "Region"}}
                ]))
                .expect("directive specs"),
            ),
        })
        .expect("submit changeset");
    let outcomes: Vec<_> = receipt
        .outcomes
        .iter()
        .map(|o| (o.state, o.reasons.clone()))
        .collect();
    let skipped = |reason: &str| (DirectiveState::Skipped, vec![reason.to_string()]);
    assert_eq!(
        outcomes,
        vec![
            skipped("data.tags: type 999 does not exist"),
            skipped("data.periods: period 999 does not exist"),
            skipped("data.type_id: type 999 does not exist"),
            skipped("data.layer_id: layer 999 does not exist"),
            (DirectiveState::Applied, Vec::new()),
        ]
    );
}

#[test]
fn deleting_a_shape_drops_relations_pointing_at_it() {
    let storage_dir = temp_dir("delete_nested_shape");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");
    let (_, [a, b, _]) = dated_shapes(&mut store);

    let parent = submit(
        &mut store,
        json!([{
            "action": "add",
            "object": "shape",
            "object_id": "s-9",
            "shape_relations": [format!("Shape-outer-{a}"), format!("Shape-outer-{b}")]
        }]),
    );
    let parent = object_id(&parent, 0);

    submit(
        &mut store,
        json!([{"action": "delete", "object": "shape", "object_id": a}]),
    );
    assert!(store.shape_get(a).expect("shape get").is_none());
    let objects = store.shape_relations(parent).expect("relations");
    assert_eq!(objects.len(), 1);
    assert_eq!((objects[0].id, objects[0].sequence), (b, 0));
}
