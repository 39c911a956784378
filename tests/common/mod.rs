//! Shared fixtures for integration tests
//!
//! Every fixture lives in its own temporary directory; nothing is read from
//! the source tree.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use validate_metadata::{RecordValidator, SchemaCache, SchemaLoader};

/// Main schema with an include file and a struct field
pub const METADATA_SCHEMA: &str = r#"[
    {"key": "pi", "type": "string", "optional": true, "section": "People"},
    {"key": "beam_energy", "type": "int64", "section": "Beam"},
    {"key": "facility", "type": "string", "value": ["CHESS", "CLASSE"], "section": "Beam"},
    {"file": "common.json"},
    {"key": "sample", "type": "struct", "schema": "sample.yaml", "optional": true, "section": "Sample"}
]"#;

/// Fields shared between schemas through `file` includes
pub const COMMON_SCHEMA: &str = r#"[
    {"key": "cycle", "type": "string", "optional": true, "section": "Run"},
    {"key": "tags", "type": "list_str", "optional": true, "section": "Run"}
]"#;

pub const SAMPLE_SCHEMA: &str = "\
- key: name
  type: string
- key: temperature
  type: float
  optional: true
  units: K
";

/// The same fields as [`METADATA_SCHEMA`] written as YAML
pub const METADATA_SCHEMA_YAML: &str = "\
- key: pi
  type: string
  optional: true
  section: People
- key: beam_energy
  type: int64
  section: Beam
- key: facility
  type: string
  value: [CHESS, CLASSE]
  section: Beam
- file: common.json
- key: sample
  type: struct
  schema: sample.yaml
  optional: true
  section: Sample
";

/// Temporary layout with `schemas/` and `records/` directories
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("schemas")).unwrap();
        std::fs::create_dir_all(dir.path().join("records")).unwrap();
        Self { dir }
    }

    /// Workspace holding the metadata schema set
    pub fn with_metadata_schema() -> Self {
        let workspace = Self::new();
        workspace.schema("metadata.json", METADATA_SCHEMA);
        workspace.schema("common.json", COMMON_SCHEMA);
        workspace.schema("sample.yaml", SAMPLE_SCHEMA);
        workspace
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn schemas_dir(&self) -> PathBuf {
        self.root().join("schemas")
    }

    pub fn records_dir(&self) -> PathBuf {
        self.root().join("records")
    }

    pub fn schema_path(&self, name: &str) -> PathBuf {
        self.schemas_dir().join(name)
    }

    pub fn schema(&self, name: &str, content: &str) -> PathBuf {
        write_file(&self.schema_path(name), content)
    }

    pub fn record(&self, name: &str, content: &str) -> PathBuf {
        write_file(&self.records_dir().join(name), content)
    }
}

pub fn write_file(path: &Path, content: &str) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
    path.to_path_buf()
}

pub fn loader(renewal_interval: Duration) -> Arc<SchemaLoader> {
    Arc::new(SchemaLoader::new(Arc::new(SchemaCache::with_interval(
        renewal_interval,
        100,
    ))))
}

pub fn record_validator(renewal_interval: Duration) -> RecordValidator {
    RecordValidator::new(loader(renewal_interval))
}
