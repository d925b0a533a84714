#![forbid(unsafe_code)]

use cm_core::{AttrValue, DirectiveSpec, DirectiveState, InputError};
use cm_storage::{
    BatchMode, ChangesetReceipt, SqliteStore, StoreConfig, StoreError, SubmitChangesetRequest,
};
use rusqlite::Connection;
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

fn specs(value: Value) -> Vec<DirectiveSpec> {
    serde_json::from_value(value).expect("directive specs")
}

fn submit(store: &mut SqliteStore, id: Option<&str>, value: Value) -> ChangesetReceipt {
    store
        .changeset_submit(SubmitChangesetRequest {
            id: id.map(str::to_string),
            directives: Some(specs(value)),
        })
        .expect("submit changeset")
}

fn states(receipt: &ChangesetReceipt) -> Vec<DirectiveState> {
    receipt.outcomes.iter().map(|o| o.state).collect()
}

fn object_id(receipt: &ChangesetReceipt, index: usize) -> i64 {
    receipt.outcomes[index]
        .object_id
        .as_deref()
        .expect("resolved object id")
        .parse()
        .expect("numeric object id")
}

fn count_rows(store: &SqliteStore, table: &str) -> i64 {
    let conn = Connection::open(store.config().db_path()).expect("open raw connection");
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .expect("count rows")
}

#[test]
fn temp_ids_resolve_to_ids_created_earlier_in_the_batch() {
    let storage_dir = temp_dir("temp_ids_resolve");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");

    let receipt = submit(
        &mut store,
        None,
        json!([
            {"action": "add", "object": "node", "object_id": "n-1", "geometry": [10.0, 50.0]},
            {"action": "add", "object": "node", "object_id": "n-2", "geometry": [11.0, 50.0]},
            {"action": "add", "object": "node", "object_id": "n-3", "geometry": [11.0, 51.0]},
            {"action": "add", "object": "way", "object_id": "w-1", "way_nodes": ["n-1", "n-2", "n-3"]},
            {
                "action": "add",
                "object": "shape",
                "object_id": "s-1",
                "data": {"start_year": 1900, "name": "Outline"},
                "shape_relations": ["0-Way-outer-w-1"]
            }
        ]),
    );
    assert_eq!(receipt.id.len(), 32);
    assert!(!receipt.replaced);
    assert!(receipt.outcomes.iter().all(|o| o.is_applied()), "{:?}", receipt.outcomes);

    let nodes: Vec<i64> = (0..3).map(|i| object_id(&receipt, i)).collect();
    let way = object_id(&receipt, 3);
    let shape = object_id(&receipt, 4);

    let members: Vec<i64> = store
        .way_nodes(way)
        .expect("way nodes")
        .iter()
        .map(|row| row.node.id)
        .collect();
    assert_eq!(members, nodes);

    let detail = store.shape_get(shape).expect("shape get").expect("shape exists");
    assert_eq!(detail.objects.len(), 1);
    assert_eq!(detail.objects[0].id, way);
    assert_eq!(detail.shape.start.year, Some(1900));
    assert_eq!(detail.shape.start.month, Some(1));
    assert_eq!(
        detail.shape.attributes.get("name"),
        Some(&AttrValue::Text("Outline".to_string()))
    );
    assert_eq!(detail.shape.changeset_id.as_deref(), Some(receipt.id.as_str()));

    let changeset = store
        .changeset_get(&receipt.id)
        .expect("changeset get")
        .expect("changeset stored");
    assert_eq!(changeset.directives.len(), 5);
    let expected: Vec<Value> = nodes.iter().map(|id| json!(id.to_string())).collect();
    assert_eq!(changeset.directives[3].directive.way_nodes, Some(Value::Array(expected)));
    assert_eq!(
        changeset.directives[4].directive.shape_relations,
        Some(json!([format!("0-Way-outer-{way}")]))
    );
    assert_eq!(changeset.directives[4].state, Some(DirectiveState::Applied));
}

#[test]
fn out_of_range_node_is_skipped_without_writing() {
    let storage_dir = temp_dir("out_of_range_node");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");

    let receipt = submit(
        &mut store,
        None,
        json!([{"action": "add", "object": "node", "object_id": "n-1", "geometry": [190, -90]}]),
    );
    let outcome = &receipt.outcomes[0];
    assert_eq!(outcome.state, DirectiveState::Skipped);
    assert!(outcome.object_id.is_none());
    assert!(
        outcome.reasons.iter().any(|r| r.contains("longitude 190")),
        "{:?}",
        outcome.reasons
    );
    assert_eq!(count_rows(&store, "nodes"), 0);
}

#[test]
fn deleted_node_is_no_longer_found() {
    let storage_dir = temp_dir("deleted_node");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");

    let created = submit(
        &mut store,
        None,
        json!([{"action": "add", "object": "node", "object_id": "n-1", "geometry": [1.5, 2.5]}]),
    );
    let node = object_id(&created, 0);
    let found = store.node_find(node).expect("node find").expect("node exists");
    assert_eq!((found.lon, found.lat), (1.5, 2.5));

    let deleted = submit(
        &mut store,
        None,
        json!([{"action": "delete", "object": "node", "object_id": node}]),
    );
    assert_eq!(states(&deleted), vec![DirectiveState::Applied]);
    assert!(store.node_find(node).expect("node find").is_none());
}

#[test]
fn resubmitted_changeset_replaces_only_the_directive_list() {
    let storage_dir = temp_dir("resubmitted_changeset");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");

    let first = submit(
        &mut store,
        Some("cs-replace"),
        json!([{
            "action": "add",
            "object": "node",
            "object_id": "n-1",
            "geometry": [3.0, 4.0],
            "data": {"name": "first"}
        }]),
    );
    assert_eq!(first.id, "cs-replace");
    let node = object_id(&first, 0);

    let second = submit(
        &mut store,
        Some("cs-replace"),
        json!([
            {"action": "edit", "object": "node", "object_id": node, "data": {"name": "second"}},
            {"action": "edit", "object": "node", "object_id": "n-7", "data": {"name": "third"}}
        ]),
    );
    assert!(second.replaced);
    assert_eq!(
        states(&second),
        vec![DirectiveState::Recorded, DirectiveState::Recorded]
    );

    let stored = store.node_find(node).expect("node find").expect("node exists");
    assert_eq!(
        stored.attributes.get("name"),
        Some(&AttrValue::Text("first".to_string()))
    );
    assert_eq!(count_rows(&store, "nodes"), 1);

    let changeset = store
        .changeset_get("cs-replace")
        .expect("changeset get")
        .expect("changeset stored");
    assert_eq!(changeset.directives.len(), 2);
    assert_eq!(changeset.directives[0].directive.action_text(), Some("edit"));
    assert_eq!(changeset.directives[0].state, Some(DirectiveState::Recorded));
    assert_eq!(changeset.directives[1].directive.object_id, Some(json!("n-7")));
}

#[test]
fn empty_batch_is_rejected_before_anything_is_stored() {
    let storage_dir = temp_dir("empty_batch");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");

    for directives in [Some(Vec::new()), None] {
        let err = store
            .changeset_submit(SubmitChangesetRequest {
                id: Some("cs-empty".to_string()),
                directives,
            })
            .expect_err("empty batch must fail");
        assert!(
            matches!(err, StoreError::Input(InputError::EmptyBatch)),
            "unexpected error: {err}"
        );
    }
    assert!(store.changeset_get("cs-empty").expect("changeset get").is_none());
    assert_eq!(count_rows(&store, "changesets"), 0);
}

#[test]
fn edit_of_unknown_id_is_skipped_and_batch_continues() {
    let storage_dir = temp_dir("edit_unknown_id");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");

    let receipt = submit(
        &mut store,
        None,
        json!([
            {"action": "edit", "object": "node", "object_id": 999, "data": {"name": "ghost"}},
            {"action": "add", "object": "node", "geometry": [0.0, 0.0]}
        ]),
    );
    assert_eq!(
        states(&receipt),
        vec![DirectiveState::Skipped, DirectiveState::Applied]
    );
    assert_eq!(receipt.outcomes[0].reasons, vec!["unknown node 999".to_string()]);
}

#[test]
fn wrongly_typed_directive_does_not_sink_the_batch() {
    let storage_dir = temp_dir("wrongly_typed_directive");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");

    let receipt = submit(
        &mut store,
        None,
        json!([
            {"action": 1, "object": "node", "geometry": [0.0, 0.0]},
            {"action": "add", "object": "node", "data": "x", "geometry": [1.0, 1.0]},
            {"action": "add", "object": "node", "geometry": [2.0, 2.0]}
        ]),
    );
    assert_eq!(
        states(&receipt),
        vec![DirectiveState::Skipped, DirectiveState::Skipped, DirectiveState::Applied]
    );
    assert_eq!(
        receipt.outcomes[0].reasons,
        vec!["action: expected a string, got 1".to_string()]
    );
    assert_eq!(
        receipt.outcomes[1].reasons,
        vec!["data: expected an object, got \"x\"".to_string()]
    );
    assert_eq!(count_rows(&store, "nodes"), 1);

    let changeset = store
        .changeset_get(&receipt.id)
        .expect("changeset get")
        .expect("changeset stored");
    assert_eq!(changeset.directives[0].directive.action, Some(json!(1)));
}

#[test]
fn all_or_nothing_rolls_back_applied_directives() {
    let storage_dir = temp_dir("all_or_nothing");
    let config = StoreConfig::new(&storage_dir).with_batch_mode(BatchMode::AllOrNothing);
    let mut store = SqliteStore::open_with(config).expect("open store");

    let receipt = submit(
        &mut store,
        None,
        json!([
            {"action": "add", "object": "node", "object_id": "n-1", "geometry": [5.0, 5.0]},
            {"action": "edit", "object": "node", "object_id": 4242, "data": {"name": "missing"}}
        ]),
    );
    assert_eq!(
        states(&receipt),
        vec![DirectiveState::RolledBack, DirectiveState::Skipped]
    );
    assert_eq!(count_rows(&store, "nodes"), 0);

    let changeset = store
        .changeset_get(&receipt.id)
        .expect("changeset get")
        .expect("changeset stored");
    assert_eq!(changeset.batch_mode, "all_or_nothing");
    assert_eq!(changeset.directives[0].state, Some(DirectiveState::RolledBack));
}

#[test]
fn foreign_key_failure_fails_one_directive_only() {
    let storage_dir = temp_dir("foreign_key_failure");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");

    let setup = submit(
        &mut store,
        None,
        json!([
            {"action": "add", "object": "layer", "object_id": "l-1", "data": {"name": "Borders", "short_name": "brd"}},
            {"action": "add", "object": "type", "object_id": "t-1", "data": {"name": "Country", "layer_id": "l-1"}}
        ]),
    );
    assert!(setup.outcomes.iter().all(|o| o.is_applied()), "{:?}", setup.outcomes);
    let layer = object_id(&setup, 0);
    let type_id = object_id(&setup, 1);
    assert_eq!(
        store.type_find(type_id).expect("type find").expect("type exists").layer_id,
        Some(layer)
    );

    let receipt = submit(
        &mut store,
        None,
        json!([
            {"action": "delete", "object": "layer", "object_id": layer},
            {"action": "add", "object": "node", "geometry": [7.0, 8.0]}
        ]),
    );
    assert_eq!(
        states(&receipt),
        vec![DirectiveState::Failed, DirectiveState::Applied]
    );
    assert!(
        receipt.outcomes[0].reasons[0].contains("FOREIGN KEY"),
        "{:?}",
        receipt.outcomes[0].reasons
    );
    assert!(store.layer_find(layer).expect("layer find").is_some());
}

#[test]
fn edit_merges_attributes_and_null_removes_keys() {
    let storage_dir = temp_dir("edit_merges_attributes");
    let mut store = SqliteStore::open(&storage_dir).expect("open store");

    let created = submit(
        &mut store,
        None,
        json!([{
            "action": "add",
            "object": "node",
            "object_id": "n-1",
            "geometry": [1.0, 1.0],
            "data": {"name": "a", "kind": "well", "depth": 12}
        }]),
    );
    let node = object_id(&created, 0);

    let edited = submit(
        &mut store,
        None,
        json!([{
            "action": "edit",
            "object": "node",
            "object_id": node,
            "geometry": [2.0, 3.0],
            "data": {"name": "b", "kind": null}
        }]),
    );
    assert_eq!(states(&edited), vec![DirectiveState::Applied]);

    let node = store.node_find(node).expect("node find").expect("node exists");
    assert_eq!((node.lon, node.lat), (2.0, 3.0));
    assert_eq!(node.attributes.get("name"), Some(&AttrValue::Text("b".to_string())));
    assert_eq!(node.attributes.get("kind"), None);
    assert_eq!(node.attributes.get("depth"), Some(&AttrValue::Integer(12)));
    assert_eq!(node.changeset_id.as_deref(), Some(edited.id.as_str()));
}
