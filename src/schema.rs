//! Schema model: field definitions and loaded schemas

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::value::Value;

/// One field of a schema
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaFieldDefinition {
    /// Record key this definition describes
    pub key: String,
    /// Declared type, e.g. "string", "int64", "list_str", "struct"
    pub declared_type: String,
    /// Optional fields may be absent from a record
    pub optional: bool,
    /// Whether the UI may submit several values
    pub allow_multiple: bool,
    /// UI section the field belongs to
    pub section: String,
    /// Allowed value(s); `Value::Null` when unconstrained
    pub allowed_value: Value,
    /// Sub-schema describing a `struct` / `list_struct` value
    pub nested_schema_ref: Option<String>,
    /// Schema file whose fields are flattened into the parent schema
    pub include_file: Option<String>,
    pub placeholder: String,
    pub units: String,
    pub description: String,
}

impl SchemaFieldDefinition {
    pub fn new(key: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            declared_type: declared_type.into(),
            optional: false,
            allow_multiple: false,
            section: String::new(),
            allowed_value: Value::Null,
            nested_schema_ref: None,
            include_file: None,
            placeholder: String::new(),
            units: String::new(),
            description: String::new(),
        }
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn with_allowed_value(mut self, allowed: impl Into<Value>) -> Self {
        self.allowed_value = allowed.into();
        self
    }

    pub fn with_nested_schema(mut self, reference: impl Into<String>) -> Self {
        self.nested_schema_ref = Some(reference.into());
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = section.into();
        self
    }

    pub fn is_mandatory(&self) -> bool {
        !self.optional
    }

    /// Field validated against a sub-schema rather than by type alone
    pub fn has_sub_schema(&self) -> bool {
        self.nested_schema_ref
            .as_deref()
            .is_some_and(|reference| !reference.is_empty())
    }

    pub fn is_list_type(&self) -> bool {
        self.declared_type.starts_with("list_")
    }

    /// Placeholder entry that only points at a file to flatten
    pub fn is_include(&self) -> bool {
        self.include_file
            .as_deref()
            .is_some_and(|file| !file.is_empty())
    }
}

/// A loaded schema, shared read-only once it leaves the loader
#[derive(Debug, Clone)]
pub struct Schema {
    pub source_path: PathBuf,
    pub fields: BTreeMap<String, SchemaFieldDefinition>,
    pub section_map: BTreeMap<String, Vec<String>>,
    /// Files flattened into this schema through `file` includes
    pub includes: Vec<PathBuf>,
    pub loaded_at: DateTime<Utc>,
}

impl Schema {
    pub fn new(source_path: PathBuf, fields: BTreeMap<String, SchemaFieldDefinition>) -> Self {
        Self {
            source_path,
            fields,
            section_map: BTreeMap::new(),
            includes: Vec::new(),
            loaded_at: Utc::now(),
        }
    }

    /// Build a schema from field definitions in declaration order, last key wins
    pub fn from_fields(
        source_path: PathBuf,
        fields: impl IntoIterator<Item = SchemaFieldDefinition>,
    ) -> Self {
        let fields = fields
            .into_iter()
            .map(|field| (field.key.clone(), field))
            .collect();
        Self::new(source_path, fields)
    }

    pub fn with_sections(mut self, section_map: BTreeMap<String, Vec<String>>) -> Self {
        self.section_map = section_map;
        self
    }

    pub fn get(&self, key: &str) -> Option<&SchemaFieldDefinition> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn mandatory_keys(&self) -> BTreeSet<String> {
        self.fields
            .values()
            .filter(|field| field.is_mandatory())
            .map(|field| field.key.clone())
            .collect()
    }

    pub fn optional_keys(&self) -> BTreeSet<String> {
        self.fields
            .values()
            .filter(|field| field.optional)
            .map(|field| field.key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Directory nested schema references are resolved against
    pub fn directory(&self) -> &Path {
        self.source_path.parent().unwrap_or(Path::new("."))
    }

    /// Group keys by their `section` attribute, keeping declaration order
    pub fn sections_from_fields<'a>(
        fields: impl IntoIterator<Item = &'a SchemaFieldDefinition>,
    ) -> BTreeMap<String, Vec<String>> {
        let mut sections: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for field in fields {
            if field.section.is_empty() || field.key.is_empty() {
                continue;
            }
            let keys = sections.entry(field.section.clone()).or_default();
            if !keys.contains(&field.key) {
                keys.push(field.key.clone());
            }
        }
        sections
    }
}
