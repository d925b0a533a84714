use super::*;
use serde_json::json;

#[test]
fn temp_ref_parsing() {
    assert_eq!(
        TempRef::parse("sc-12"),
        Some(TempRef::new(ObjectKind::Source, 12))
    );
    assert_eq!(TempRef::parse("n-"), None);
    assert_eq!(TempRef::parse("x-1"), None);
    assert_eq!(TempRef::parse("n-1a"), None);
    assert_eq!(TempRef::new(ObjectKind::Period, 3).to_string(), "p-3");
}

#[test]
fn entity_ref_parsing() {
    assert_eq!(EntityRef::parse(" 42 ").unwrap(), EntityRef::Real(42));
    assert_eq!(
        EntityRef::parse("w-7").unwrap(),
        EntityRef::Temp(TempRef::new(ObjectKind::Way, 7))
    );
    assert_eq!(EntityRef::parse("").unwrap_err(), RefParseError::Empty);
    assert!(matches!(
        EntityRef::parse("-3"),
        Err(RefParseError::Malformed(_))
    ));
    assert!(EntityRef::Real(1).matches_kind(ObjectKind::Layer));
    assert!(!EntityRef::Temp(TempRef::new(ObjectKind::Way, 1)).matches_kind(ObjectKind::Node));
}

#[test]
fn object_kind_is_case_insensitive() {
    assert_eq!(ObjectKind::parse("Shape"), Some(ObjectKind::Shape));
    assert_eq!(ObjectKind::parse(" SOURCE "), Some(ObjectKind::Source));
    assert_eq!(ObjectKind::parse("relation"), None);
    for kind in ObjectKind::ALL {
        assert_eq!(ObjectKind::from_temp_prefix(kind.temp_prefix()), Some(kind));
    }
}

#[test]
fn changeset_id_validation() {
    assert_eq!(ChangesetId::try_new("").unwrap_err(), ChangesetIdError::Empty);
    assert_eq!(
        ChangesetId::try_new("a b").unwrap_err(),
        ChangesetIdError::InvalidChar
    );
    assert_eq!(
        ChangesetId::try_new("x".repeat(129)).unwrap_err(),
        ChangesetIdError::TooLong
    );
    assert_eq!(ChangesetId::try_new("cs-1").unwrap().as_str(), "cs-1");
}

#[test]
fn attribute_patch_merges_and_removes() {
    let mut map = AttributeMap::from_json_str(r#"{"name":"Rome","pop":3}"#).unwrap();
    let mut patch = AttributePatch::default();
    patch.set("pop", AttrValue::Integer(4));
    patch.set("capital", AttrValue::Bool(true));
    patch.remove("name");
    map.apply(&patch);

    assert_eq!(map.get("name"), None);
    assert_eq!(map.get("pop"), Some(&AttrValue::Integer(4)));
    assert_eq!(map.get("capital"), Some(&AttrValue::Bool(true)));
    assert_eq!(
        map.to_json_string().unwrap(),
        r#"{"capital":true,"pop":4}"#
    );
}

#[test]
fn attribute_map_from_blank_text_is_empty() {
    assert!(AttributeMap::from_json_str("  ").unwrap().is_empty());
}

#[test]
fn attr_values_are_scalars_only() {
    assert_eq!(AttrValue::from_json(&json!(1.5)), Some(AttrValue::Float(1.5)));
    assert_eq!(AttrValue::from_json(&json!([1])), None);
    assert_eq!(AttrValue::from_json(&json!(null)), None);
    assert_eq!(AttrValue::Text("a".into()).to_json(), json!("a"));
}

#[test]
fn lon_lat_bounds() {
    assert!(LonLat::try_new(180.0, 90.0).is_ok());
    assert_eq!(
        LonLat::try_new(10.0, -91.0).unwrap_err(),
        GeometryError::LatitudeOutOfRange(-91.0)
    );
    assert!(LonLat::try_new(f64::NAN, 0.0).is_err());
}

#[test]
fn date_parts_key_defaults_month_and_day() {
    let date = DateParts {
        year: Some(1900),
        month: None,
        day: None,
    };
    assert_eq!(date.key(), Some((1900, 1, 1)));
    assert!(DateParts::default().is_empty());
}

#[test]
fn shape_query_needs_exactly_one_selector() {
    assert_eq!(
        ShapeQuery::default().selector().unwrap_err(),
        InputError::MissingSelector
    );
    assert_eq!(
        ShapeQuery::by_ids(Vec::new()).selector().unwrap_err(),
        InputError::MissingSelector
    );
    let mut both = ShapeQuery::by_year(1500);
    both.period = Some(2);
    assert_eq!(both.selector().unwrap_err(), InputError::MissingSelector);

    let query = ShapeQuery::by_changeset(" abc ").with_types(vec![3]);
    assert_eq!(query.selector().unwrap(), ShapeSelector::Changeset("abc"));
    assert_eq!(query.type_filter(), Some(&[3][..]));
}

#[test]
fn bounding_box_is_inclusive() {
    let bbox = BoundingBox {
        west: 0.0,
        south: 0.0,
        east: 10.0,
        north: 5.0,
    };
    assert!(bbox.contains(LonLat { lon: 10.0, lat: 5.0 }));
    assert!(!bbox.contains(LonLat { lon: 10.5, lat: 1.0 }));
    assert!(BoundingBox::world().contains(LonLat { lon: -180.0, lat: 90.0 }));
}

#[test]
fn directive_record_serializes_state_next_to_fields() {
    let spec: DirectiveSpec = serde_json::from_value(json!({
        "action": "delete",
        "object": "layer",
        "object_id": 4,
        "user_id": 2
    }))
    .unwrap();
    let mut record = DirectiveRecord::from_spec(&spec);
    record.state = Some(DirectiveState::RolledBack);
    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(
        value,
        json!({
            "action": "delete",
            "object": "layer",
            "object_id": 4,
            "user_id": 2,
            "state": "rolled_back"
        })
    );
}
