#![forbid(unsafe_code)]

use super::*;
use serde_json::json;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn apply_reads_file_and_optional_id() {
    let cli = parse_args(&args(&["--storage-dir", "/tmp/cm", "apply", "batch.json", "--id", "cs-1"]))
        .expect("parse apply");
    assert_eq!(cli.storage_dir, Some(PathBuf::from("/tmp/cm")));
    assert_eq!(
        cli.command,
        Command::Apply {
            input: "batch.json".to_string(),
            id: Some("cs-1".to_string()),
        }
    );

    let cli = parse_args(&args(&["apply", "-"])).expect("parse stdin apply");
    assert_eq!(
        cli.command,
        Command::Apply {
            input: "-".to_string(),
            id: None,
        }
    );
    assert!(parse_args(&args(&["apply"])).is_err());
}

#[test]
fn query_commands_collect_selector_and_filters() {
    let cli = parse_args(&args(&[
        "nodes",
        "--year",
        "1500",
        "--types",
        "3, 4",
        "--bbox",
        "-10,-5,10,5",
    ]))
    .expect("parse nodes query");
    let Command::Query { view, query } = cli.command else {
        panic!("expected a query command");
    };
    assert_eq!(view, View::Nodes);
    assert_eq!(query.year, Some(1500));
    assert_eq!(query.types, Some(vec![3, 4]));
    assert_eq!(
        query.bbox,
        Some(BoundingBox {
            west: -10.0,
            south: -5.0,
            east: 10.0,
            north: 5.0,
        })
    );
}

#[test]
fn query_needs_exactly_one_selector() {
    let err = parse_args(&args(&["data", "--types", "1"])).expect_err("no selector");
    assert!(err.contains("exactly one"), "{err}");
    let err = parse_args(&args(&["geometry", "--ids", "1,2", "--period", "4"]))
        .expect_err("two selectors");
    assert!(err.contains("exactly one"), "{err}");
}

#[test]
fn misplaced_and_unknown_flags_are_rejected() {
    let err = parse_args(&args(&["shape", "4", "--year", "1500"])).expect_err("year on shape");
    assert_eq!(err, "--year only applies to data, nodes or geometry");
    let err = parse_args(&args(&["data", "--ids", "1", "--id", "x"])).expect_err("id on data");
    assert_eq!(err, "--id only applies to apply");
    let err = parse_args(&args(&["apply", "x.json", "--force"])).expect_err("unknown flag");
    assert!(err.starts_with("Unknown arg: --force"), "{err}");
    assert!(parse_args(&args(&["--bbox", "1,2,3", "data", "--year", "1"])).is_err());
    assert!(parse_args(&args(&["--batch-mode", "sometimes", "changeset", "x"])).is_err());
    assert!(parse_args(&args(&["shape", "abc"])).is_err());
}

#[test]
fn flags_override_store_defaults() {
    let cli = parse_args(&args(&[
        "--storage-dir",
        "/tmp/cm-flags",
        "--busy-timeout-ms",
        "250",
        "--batch-mode",
        "all-or-nothing",
        "changeset",
        "abc",
    ]))
    .expect("parse globals");
    let config = store_config(&cli);
    assert_eq!(config.storage_dir, PathBuf::from("/tmp/cm-flags"));
    assert_eq!(config.busy_timeout, Duration::from_millis(250));
    assert_eq!(config.batch_mode, BatchMode::AllOrNothing);
}

#[test]
fn submission_accepts_array_or_object() {
    let request = parse_submission(
        &json!([{"action": "add", "object": "node", "object_id": "n-1", "geometry": [1.0, 2.0]}])
            .to_string(),
        None,
    )
    .expect("array submission");
    assert_eq!(request.id, None);
    assert_eq!(request.directives.as_ref().map(Vec::len), Some(1));

    let request = parse_submission(
        &json!({"id": "body-id", "directives": [{"action": "delete", "object": "layer", "object_id": 2}]})
            .to_string(),
        Some("flag-id".to_string()),
    )
    .expect("object submission");
    assert_eq!(request.id.as_deref(), Some("flag-id"));

    assert!(parse_submission("42", None).is_err());
    assert!(parse_submission("{not json", None).is_err());
}
