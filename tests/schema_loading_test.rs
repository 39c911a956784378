//! Schema loading across files: formats, includes, sub-schemas and renewal

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    COMMON_SCHEMA, METADATA_SCHEMA, METADATA_SCHEMA_YAML, SAMPLE_SCHEMA, Workspace, loader,
    record_validator, write_file,
};
use validate_metadata::{
    Record, SchemaCache, SchemaLoader, ValidationError, Value, decode_records,
};

const HOUR: Duration = Duration::from_secs(3600);

fn record(json: &str) -> Record {
    let mut records = decode_records(std::path::Path::new("record.json"), json).unwrap();
    records.remove(0)
}

#[test]
fn test_json_and_yaml_schemas_are_equivalent() {
    let workspace = Workspace::with_metadata_schema();
    let yaml_path = workspace.schema("metadata.yaml", METADATA_SCHEMA_YAML);
    let loader = loader(HOUR);

    let from_json = loader.load(&workspace.schema_path("metadata.json")).unwrap();
    let from_yaml = loader.load(&yaml_path).unwrap();

    assert_eq!(from_json.fields, from_yaml.fields);
    assert_eq!(from_json.section_map, from_yaml.section_map);
    assert_eq!(
        from_json.mandatory_keys().into_iter().collect::<Vec<_>>(),
        vec!["beam_energy", "facility"]
    );
}

#[test]
fn test_include_fields_are_flattened() {
    let workspace = Workspace::with_metadata_schema();
    let schema = loader(HOUR)
        .load(&workspace.schema_path("metadata.json"))
        .unwrap();

    assert!(schema.contains_key("cycle"));
    assert!(schema.contains_key("tags"));
    assert!(!schema.contains_key(""));
    assert_eq!(schema.len(), 6);
    assert_eq!(schema.section_map["Run"], vec!["cycle", "tags"]);
}

#[test]
fn test_nested_includes_resolve_against_including_file() {
    let workspace = Workspace::new();
    workspace.schema("top.json", r#"[{"file": "parts/middle.json"}, {"key": "a", "type": "int"}]"#);
    workspace.schema(
        "parts/middle.json",
        r#"[{"file": "leaf.yaml"}, {"key": "b", "type": "string"}]"#,
    );
    workspace.schema("parts/leaf.yaml", "- key: c\n  type: bool\n");

    let schema = loader(HOUR).load(&workspace.schema_path("top.json")).unwrap();

    assert_eq!(schema.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
}

#[test]
fn test_include_cycle_is_reported() {
    let workspace = Workspace::new();
    workspace.schema("a.json", r#"[{"file": "b.json"}]"#);
    workspace.schema("b.json", r#"[{"file": "a.json"}]"#);

    let err = loader(HOUR)
        .load(&workspace.schema_path("a.json"))
        .unwrap_err();

    assert!(matches!(err, ValidationError::SchemaCycle { .. }));
    assert!(err.is_schema_failure());
}

#[test]
fn test_later_definition_overrides_included_one() {
    let workspace = Workspace::new();
    workspace.schema("shared.json", r#"[{"key": "pi", "type": "string"}]"#);
    workspace.schema(
        "main.json",
        r#"[{"file": "shared.json"}, {"key": "pi", "type": "string", "optional": true}]"#,
    );

    let schema = loader(HOUR).load(&workspace.schema_path("main.json")).unwrap();

    assert!(schema.get("pi").unwrap().optional);
    assert!(schema.mandatory_keys().is_empty());
}

#[test]
fn test_web_sections_file_replaces_field_sections() {
    let workspace = Workspace::with_metadata_schema();
    let sections = write_file(
        &workspace.root().join("web_sections.json"),
        r#"{"Overview": ["pi", "facility"]}"#,
    );

    let loader = SchemaLoader::new(Arc::new(SchemaCache::with_interval(HOUR, 10)))
        .with_web_sections(Some(sections));
    let schema = loader.load(&workspace.schema_path("metadata.json")).unwrap();

    assert_eq!(schema.section_map.len(), 1);
    assert_eq!(schema.section_map["Overview"], vec!["pi", "facility"]);
}

#[test]
fn test_missing_web_sections_file_falls_back() {
    let workspace = Workspace::with_metadata_schema();
    let loader = SchemaLoader::new(Arc::new(SchemaCache::with_interval(HOUR, 10)))
        .with_web_sections(Some(workspace.root().join("missing.json")));

    let schema = loader.load(&workspace.schema_path("metadata.json")).unwrap();

    assert_eq!(schema.section_map["Beam"], vec!["beam_energy", "facility"]);
}

#[test]
fn test_record_against_schema_set() {
    let workspace = Workspace::with_metadata_schema();
    let validator = record_validator(HOUR);
    let schema_path = workspace.schema_path("metadata.json");

    let valid = record(
        r#"{"pi": "Smith", "beam_energy": 5, "facility": "CHESS",
            "tags": ["a", "b"], "sample": {"name": "Si", "temperature": 4.2}}"#,
    );
    assert!(validator.validate_path(&schema_path, &valid).is_ok());

    let wrong_sample = record(
        r#"{"beam_energy": 5, "facility": "CHESS", "sample": {"name": "Si", "temperature": "cold"}}"#,
    );
    assert!(matches!(
        validator.validate_path(&schema_path, &wrong_sample).unwrap_err(),
        ValidationError::TypeMismatch { key, .. } if key == "temperature"
    ));

    let not_allowed = record(r#"{"beam_energy": 5, "facility": "SLAC"}"#);
    assert!(matches!(
        validator.validate_path(&schema_path, &not_allowed).unwrap_err(),
        ValidationError::ValueMismatch { key, .. } if key == "facility"
    ));
}

#[test]
fn test_pi_without_beam_energy_is_rejected() {
    let workspace = Workspace::new();
    let schema_path = workspace.schema(
        "pi.json",
        r#"[{"key": "pi", "type": "string", "optional": true},
            {"key": "beam_energy", "type": "int64", "optional": false}]"#,
    );
    let validator = record_validator(HOUR);

    let err = validator
        .validate_path(&schema_path, &record(r#"{"pi": "Smith"}"#))
        .unwrap_err();

    match err {
        ValidationError::MissingMandatoryKeys { missing } => {
            assert_eq!(missing, vec!["beam_energy".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }

    let mut complete = record(r#"{"pi": "Smith"}"#);
    complete.insert("beam_energy".to_string(), Value::Int(5300));
    assert!(validator.validate_path(&schema_path, &complete).is_ok());
}

#[test]
fn test_missing_sub_schema_is_reported_for_struct_key() {
    let workspace = Workspace::new();
    let schema_path = workspace.schema(
        "main.json",
        r#"[{"key": "sample", "type": "struct", "schema": "absent.yaml"}]"#,
    );

    let err = record_validator(HOUR)
        .validate_path(&schema_path, &record(r#"{"sample": {"name": "Si"}}"#))
        .unwrap_err();

    match err {
        ValidationError::SubSchemaLoad { key, .. } => assert_eq!(key, "sample"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_cached_schema_survives_file_edit_within_interval() {
    let workspace = Workspace::new();
    let schema_path = workspace.schema("main.json", r#"[{"key": "pi", "type": "string"}]"#);
    let loader = loader(HOUR);

    let first = loader.load(&schema_path).unwrap();
    write_file(&schema_path, r#"[{"key": "detector", "type": "string"}]"#);
    let second = loader.load(&schema_path).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(second.contains_key("pi"));
    assert_eq!(loader.cache().stats().hits, 1);
}

#[test]
fn test_zero_interval_reloads_every_time() {
    let workspace = Workspace::new();
    let schema_path = workspace.schema("main.json", r#"[{"key": "pi", "type": "string"}]"#);
    let loader = loader(Duration::ZERO);

    let first = loader.load(&schema_path).unwrap();
    write_file(&schema_path, r#"[{"key": "detector", "type": "string"}]"#);
    let second = loader.load(&schema_path).unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(second.contains_key("detector"));
    assert!(!second.contains_key("pi"));
}

#[test]
fn test_expired_schema_is_reloaded() {
    let workspace = Workspace::new();
    let schema_path = workspace.schema("main.json", r#"[{"key": "pi", "type": "string"}]"#);
    let loader = loader(Duration::from_millis(50));

    loader.load(&schema_path).unwrap();
    write_file(&schema_path, r#"[{"key": "detector", "type": "string"}]"#);
    std::thread::sleep(Duration::from_millis(120));
    let reloaded = loader.load(&schema_path).unwrap();

    assert!(reloaded.contains_key("detector"));
    assert!(loader.cache().stats().stale >= 1);
}

#[test]
fn test_sub_schemas_share_the_cache() {
    let workspace = Workspace::new();
    workspace.schema("common.json", COMMON_SCHEMA);
    workspace.schema("sample.yaml", SAMPLE_SCHEMA);
    let schema_path = workspace.schema("metadata.json", METADATA_SCHEMA);
    let validator = record_validator(HOUR);

    let with_sample =
        record(r#"{"beam_energy": 1, "facility": "CLASSE", "sample": {"name": "Si"}}"#);
    validator.validate_path(&schema_path, &with_sample).unwrap();
    validator.validate_path(&schema_path, &with_sample).unwrap();

    let cache = validator.loader().cache();
    assert!(cache.contains(&std::fs::canonicalize(workspace.schema_path("sample.yaml")).unwrap()));
    assert!(cache.stats().hits >= 2);
}
