use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::SchemaCache;
use crate::config::SchemaConfig;
use crate::error::{Result, ValidationError};
use crate::schema::{Schema, SchemaFieldDefinition};
use crate::value::Value;

/// Default limit on nested schema file includes
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 16;

/// One field object as written in a schema file
///
/// JSON and YAML share this layout; only the decoded `value` type differs.
#[derive(Debug, Deserialize)]
struct FieldRecord<V> {
    #[serde(default)]
    key: Option<String>,
    #[serde(default, rename = "type")]
    field_type: Option<String>,
    #[serde(default)]
    optional: Option<bool>,
    #[serde(default)]
    multiple: Option<bool>,
    #[serde(default)]
    section: Option<String>,
    value: Option<V>,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    placeholder: Option<String>,
    #[serde(default)]
    units: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    file: Option<String>,
}

impl<V: Into<Value>> FieldRecord<V> {
    fn into_definition(self) -> SchemaFieldDefinition {
        let mut def = SchemaFieldDefinition::new(
            self.key.unwrap_or_default(),
            self.field_type.unwrap_or_default(),
        );
        def.optional = self.optional.unwrap_or(false);
        def.allow_multiple = self.multiple.unwrap_or(false);
        def.section = self.section.unwrap_or_default();
        def.allowed_value = self.value.map(Into::into).unwrap_or(Value::Null);
        def.nested_schema_ref = self.schema.filter(|s| !s.is_empty());
        def.include_file = self.file.filter(|f| !f.is_empty());
        def.placeholder = self.placeholder.unwrap_or_default();
        def.units = self.units.unwrap_or_default();
        def.description = self.description.unwrap_or_default();
        def
    }
}

/// Schema file encodings understood by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFormat {
    Json,
    Yaml,
}

impl SchemaFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "json" => Ok(SchemaFormat::Json),
            "yaml" | "yml" => Ok(SchemaFormat::Yaml),
            _ => Err(ValidationError::SchemaFormat {
                path: path.to_path_buf(),
                extension,
            }),
        }
    }
}

/// Parse schema file content into field definitions, in declaration order
pub fn parse_fields(
    path: &Path,
    content: &str,
    format: SchemaFormat,
) -> Result<Vec<SchemaFieldDefinition>> {
    let parse_error = |details: String| ValidationError::SchemaParse {
        path: path.to_path_buf(),
        details,
    };

    let fields = match format {
        SchemaFormat::Json => serde_json::from_str::<Vec<FieldRecord<serde_json::Value>>>(content)
            .map_err(|e| parse_error(e.to_string()))?
            .into_iter()
            .map(FieldRecord::into_definition)
            .collect(),
        SchemaFormat::Yaml => serde_yaml::from_str::<Vec<FieldRecord<serde_yaml::Value>>>(content)
            .map_err(|e| parse_error(e.to_string()))?
            .into_iter()
            .map(FieldRecord::into_definition)
            .collect(),
    };

    Ok(fields)
}

/// Loads schema files, flattens nested file includes and populates the cache
///
/// The loader is synchronous; the batch engine calls it from blocking tasks.
pub struct SchemaLoader {
    cache: Arc<SchemaCache>,
    web_sections_file: Option<PathBuf>,
    max_include_depth: usize,
}

impl SchemaLoader {
    pub fn new(cache: Arc<SchemaCache>) -> Self {
        Self {
            cache,
            web_sections_file: None,
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
        }
    }

    pub fn from_config(cache: Arc<SchemaCache>, config: &SchemaConfig) -> Self {
        Self::new(cache)
            .with_web_sections(config.web_sections_file.clone())
            .with_max_include_depth(config.max_include_depth)
    }

    pub fn with_web_sections(mut self, path: Option<PathBuf>) -> Self {
        self.web_sections_file = path;
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    /// Load a schema, serving it from the cache while it is fresh
    pub fn load(&self, path: &Path) -> Result<Arc<Schema>> {
        let mut chain = Vec::new();
        self.load_in_chain(path, &mut chain).inspect_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to load schema");
        })
    }

    /// Load the sub-schema a struct field refers to
    pub fn load_sub_schema(
        &self,
        parent_path: &Path,
        key: &str,
        reference: &str,
    ) -> Result<Arc<Schema>> {
        let path = Self::resolve_reference(parent_path, reference);
        self.load(&path)
            .map_err(|e| ValidationError::SubSchemaLoad {
                key: key.to_string(),
                path,
                details: e.to_string(),
            })
    }

    /// Resolve a schema file reference against the referring schema's directory
    pub fn resolve_reference(parent_path: &Path, reference: &str) -> PathBuf {
        let reference = Path::new(reference);
        if reference.is_absolute() {
            reference.to_path_buf()
        } else {
            parent_path
                .parent()
                .unwrap_or(Path::new("."))
                .join(reference)
        }
    }

    /// Every file the schema at `path` is assembled from: the schema itself,
    /// its includes and the sub-schemas its struct fields refer to, transitively.
    /// A sub-schema that fails to load is listed under its resolved path.
    pub fn schema_files(&self, path: &Path) -> Result<BTreeSet<PathBuf>> {
        let mut files = BTreeSet::new();
        let mut pending = vec![self.load(path)?];

        while let Some(schema) = pending.pop() {
            if !files.insert(schema.source_path.clone()) {
                continue;
            }
            files.extend(schema.includes.iter().cloned());

            for def in schema.fields.values().filter(|def| def.has_sub_schema()) {
                let Some(reference) = def.nested_schema_ref.as_deref() else {
                    continue;
                };
                let sub_path = Self::resolve_reference(&schema.source_path, reference);
                match self.load(&sub_path) {
                    Ok(sub_schema) => pending.push(sub_schema),
                    Err(_) => {
                        files.insert(std::fs::canonicalize(&sub_path).unwrap_or(sub_path));
                    }
                }
            }
        }

        Ok(files)
    }

    /// Get the cache for direct access
    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    fn load_in_chain(&self, path: &Path, chain: &mut Vec<PathBuf>) -> Result<Arc<Schema>> {
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        if chain.contains(&path) || chain.len() >= self.max_include_depth {
            return Err(ValidationError::SchemaCycle { path });
        }

        if let Some(schema) = self.cache.get(&path) {
            return Ok(schema);
        }

        chain.push(path.clone());
        let loaded = self.read_schema(&path, chain);
        chain.pop();

        let schema = Arc::new(loaded?);
        self.cache.put(path.clone(), schema.clone());
        tracing::debug!(
            path = %path.display(),
            fields = schema.len(),
            "loaded schema"
        );

        Ok(schema)
    }

    fn read_schema(&self, path: &Path, chain: &mut Vec<PathBuf>) -> Result<Schema> {
        let content = std::fs::read_to_string(path).map_err(|source| ValidationError::SchemaRead {
            path: path.to_path_buf(),
            source,
        })?;
        let format = SchemaFormat::from_path(path)?;

        let mut ordered = Vec::new();
        let mut includes = Vec::new();
        for def in parse_fields(path, &content, format)? {
            if let Some(file) = def.include_file.as_deref().filter(|_| def.is_include()) {
                let include_path = Self::resolve_reference(path, file);
                let included = self.load_in_chain(&include_path, chain)?;
                ordered.extend(included.fields.values().cloned());
                includes.push(included.source_path.clone());
                includes.extend(included.includes.iter().cloned());
            } else {
                ordered.push(def);
            }
        }

        let section_map = match self.load_web_sections() {
            Some(sections) => sections,
            None => Schema::sections_from_fields(&ordered),
        };

        let mut schema = Schema::from_fields(path.to_path_buf(), ordered).with_sections(section_map);
        schema.fields.remove("");
        schema.includes = includes;

        Ok(schema)
    }

    /// Read the configured web-sections file; problems are reported and ignored
    fn load_web_sections(&self) -> Option<BTreeMap<String, Vec<String>>> {
        let path = self.web_sections_file.as_ref()?;

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unable to read web sections file");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(sections) => Some(sections),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unable to parse web sections file");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn loader_with_interval(interval: Duration) -> SchemaLoader {
        SchemaLoader::new(Arc::new(SchemaCache::with_interval(interval, 100)))
    }

    fn loader() -> SchemaLoader {
        loader_with_interval(Duration::from_secs(3600))
    }

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    const SAMPLE_JSON: &str = r#"[
        {"key": "pi", "type": "string", "optional": true, "section": "People"},
        {"key": "beam_energy", "type": "int64", "optional": false, "section": "Beam"},
        {"key": "facility", "type": "string", "value": ["CHESS", "CLASSE"], "section": "Beam"}
    ]"#;

    #[test]
    fn test_load_json_schema() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "sample.json", SAMPLE_JSON);

        let schema = loader().load(&path).unwrap();

        assert_eq!(schema.len(), 3);
        let pi = schema.get("pi").unwrap();
        assert!(pi.optional);
        assert_eq!(pi.declared_type, "string");
        assert_eq!(schema.get("beam_energy").unwrap().declared_type, "int64");
        assert_eq!(
            schema.get("facility").unwrap().allowed_value,
            Value::from(vec!["CHESS", "CLASSE"])
        );
        assert_eq!(schema.section_map["Beam"], vec!["beam_energy", "facility"]);
    }

    #[test]
    fn test_load_yaml_schema() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "sample.yaml",
            "- key: pi\n  type: string\n  optional: true\n  description: Principal investigator\n\
             - key: beam_energy\n  type: int\n  placeholder: \"123\"\n",
        );

        let schema = loader().load(&path).unwrap();

        assert_eq!(schema.len(), 2);
        assert_eq!(
            schema.get("pi").unwrap().description,
            "Principal investigator"
        );
        assert!(schema.get("beam_energy").unwrap().is_mandatory());
        assert_eq!(schema.get("beam_energy").unwrap().placeholder, "123");
    }

    #[test]
    fn test_cached_load_returns_same_schema() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "sample.json", SAMPLE_JSON);
        let loader = loader();

        let first = loader.load(&path).unwrap();
        let second = loader.load(&path).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.cache().stats().hits, 1);
    }

    #[test]
    fn test_zero_interval_reloads_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "sample.json", SAMPLE_JSON);
        let loader = loader_with_interval(Duration::ZERO);

        let first = loader.load(&path).unwrap();
        fs::write(&path, r#"[{"key": "run", "type": "int"}]"#).unwrap();
        let second = loader.load(&path).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 1);
        assert!(second.contains_key("run"));
    }

    #[test]
    fn test_include_is_flattened() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "beam.json",
            r#"[{"key": "beam_energy", "type": "int"}, {"key": "cycle", "type": "string"}]"#,
        );
        let path = write(
            &dir,
            "main.json",
            r#"[
                {"key": "pi", "type": "string"},
                {"key": "", "type": "", "file": "beam.json"}
            ]"#,
        );

        let schema = loader().load(&path).unwrap();

        assert_eq!(schema.len(), 3);
        assert!(schema.contains_key("beam_energy"));
        assert!(schema.contains_key("cycle"));
        assert!(!schema.contains_key(""));
    }

    #[test]
    fn test_include_last_definition_wins() {
        let dir = TempDir::new().unwrap();
        write(&dir, "child.json", r#"[{"key": "run", "type": "int"}]"#);
        let path = write(
            &dir,
            "main.json",
            r#"[{"key": "run", "type": "string"}, {"key": "", "file": "child.json"}]"#,
        );

        let schema = loader().load(&path).unwrap();
        assert_eq!(schema.get("run").unwrap().declared_type, "int");
    }

    #[test]
    fn test_empty_key_placeholder_removed() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "main.json",
            r#"[{"key": "", "type": "string"}, {"key": "run", "type": "int"}]"#,
        );

        let schema = loader().load(&path).unwrap();
        assert_eq!(schema.keys().collect::<Vec<_>>(), vec!["run"]);
    }

    #[test]
    fn test_self_include_is_a_cycle() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "self.json", r#"[{"key": "", "file": "self.json"}]"#);

        let err = loader().load(&path).unwrap_err();
        assert!(matches!(err, ValidationError::SchemaCycle { .. }));
    }

    #[test]
    fn test_mutual_include_is_a_cycle() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.json", r#"[{"key": "", "file": "b.json"}]"#);
        write(&dir, "b.json", r#"[{"key": "", "file": "a.json"}]"#);

        let err = loader().load(&dir.path().join("a.json")).unwrap_err();
        assert!(matches!(err, ValidationError::SchemaCycle { .. }));
    }

    #[test]
    fn test_include_depth_limit() {
        let dir = TempDir::new().unwrap();
        write(&dir, "level0.json", r#"[{"key": "", "file": "level1.json"}]"#);
        write(&dir, "level1.json", r#"[{"key": "", "file": "level2.json"}]"#);
        write(&dir, "level2.json", r#"[{"key": "run", "type": "int"}]"#);

        let shallow = loader().with_max_include_depth(2);
        let err = shallow.load(&dir.path().join("level0.json")).unwrap_err();
        assert!(matches!(err, ValidationError::SchemaCycle { .. }));

        let deep = loader().with_max_include_depth(3);
        assert!(deep.load(&dir.path().join("level0.json")).is_ok());
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "schema.xml", "<schema/>");

        match loader().load(&path).unwrap_err() {
            ValidationError::SchemaFormat { extension, .. } => assert_eq!(extension, "xml"),
            other => panic!("Expected SchemaFormat, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = loader().load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ValidationError::SchemaRead { .. }));
    }

    #[test]
    fn test_missing_file_is_reported_before_its_format() {
        let dir = TempDir::new().unwrap();
        let err = loader().load(&dir.path().join("absent.xml")).unwrap_err();
        assert!(matches!(err, ValidationError::SchemaRead { .. }));
    }

    #[test]
    fn test_includes_are_recorded() {
        let dir = TempDir::new().unwrap();
        write(&dir, "main.json", r#"[{"file": "middle.json"}, {"key": "a", "type": "int"}]"#);
        write(&dir, "middle.json", r#"[{"file": "leaf.json"}]"#);
        write(&dir, "leaf.json", r#"[{"key": "b", "type": "int"}]"#);

        let schema = loader().load(&dir.path().join("main.json")).unwrap();
        let names: Vec<_> = schema
            .includes
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["middle.json", "leaf.json"]);
    }

    #[test]
    fn test_schema_files_cover_includes_and_sub_schemas() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "main.json",
            r#"[{"file": "common.json"},
                {"key": "sample", "type": "struct", "schema": "sample.json"},
                {"key": "holder", "type": "struct", "schema": "absent.json"}]"#,
        );
        write(&dir, "common.json", r#"[{"key": "cycle", "type": "string"}]"#);
        write(
            &dir,
            "sample.json",
            r#"[{"key": "mount", "type": "struct", "schema": "mount.yaml"}]"#,
        );
        write(&dir, "mount.yaml", "- key: angle\n  type: float\n");

        let files = loader().schema_files(&dir.path().join("main.json")).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(files.len(), 5);
        for name in ["main.json", "common.json", "sample.json", "mount.yaml", "absent.json"] {
            assert!(names.contains(&name.to_string()), "{name}");
        }
    }

    #[test]
    fn test_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "broken.json", r#"[{"key": "run""#);

        let err = loader().load(&path).unwrap_err();
        assert!(matches!(err, ValidationError::SchemaParse { .. }));
    }

    #[test]
    fn test_web_sections_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "sample.json", SAMPLE_JSON);
        let sections = write(
            &dir,
            "web_sections.json",
            r#"{"Overview": ["facility", "pi"]}"#,
        );

        let schema = loader()
            .with_web_sections(Some(sections))
            .load(&path)
            .unwrap();

        assert_eq!(schema.section_map.len(), 1);
        assert_eq!(schema.section_map["Overview"], vec!["facility", "pi"]);
    }

    #[test]
    fn test_unreadable_web_sections_fall_back() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "sample.json", SAMPLE_JSON);

        let schema = loader()
            .with_web_sections(Some(dir.path().join("absent.json")))
            .load(&path)
            .unwrap();

        assert_eq!(schema.section_map["People"], vec!["pi"]);
    }

    #[test]
    fn test_sub_schema_failure_is_wrapped() {
        let dir = TempDir::new().unwrap();
        let parent = write(&dir, "main.json", SAMPLE_JSON);

        match loader()
            .load_sub_schema(&parent, "sample", "missing.json")
            .unwrap_err()
        {
            ValidationError::SubSchemaLoad { key, path, .. } => {
                assert_eq!(key, "sample");
                assert_eq!(path, dir.path().join("missing.json"));
            }
            other => panic!("Expected SubSchemaLoad, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_reference() {
        let parent = Path::new("/schemas/main.json");
        assert_eq!(
            SchemaLoader::resolve_reference(parent, "nested/sample.json"),
            PathBuf::from("/schemas/nested/sample.json")
        );
        assert_eq!(
            SchemaLoader::resolve_reference(parent, "/abs/sample.json"),
            PathBuf::from("/abs/sample.json")
        );
    }

    #[test]
    fn test_json_and_yaml_parse_alike() {
        let json = parse_fields(
            Path::new("s.json"),
            r#"[{"key": "run", "type": "int", "value": [1, 2]}]"#,
            SchemaFormat::Json,
        )
        .unwrap();
        let yaml = parse_fields(
            Path::new("s.yaml"),
            "- key: run\n  type: int\n  value: [1, 2]\n",
            SchemaFormat::Yaml,
        )
        .unwrap();

        assert_eq!(json, yaml);
    }
}
