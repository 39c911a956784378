//! Record and struct validation against a loaded schema

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use crate::config::ValidationConfig;
use crate::error::{Result, ValidationError};
use crate::rules::{ValueMatching, check_type, check_value};
use crate::schema::{Schema, SchemaFieldDefinition};
use crate::schema_loader::SchemaLoader;
use crate::value::{Record, Value, classify};

/// Validates metadata records against schemas
///
/// Holds no per-call state; one validator can be shared across threads.
pub struct RecordValidator {
    loader: Arc<SchemaLoader>,
    skip_keys: BTreeSet<String>,
    matching: ValueMatching,
}

impl RecordValidator {
    pub fn new(loader: Arc<SchemaLoader>) -> Self {
        Self {
            loader,
            skip_keys: BTreeSet::new(),
            matching: ValueMatching::default(),
        }
    }

    pub fn from_config(loader: Arc<SchemaLoader>, config: &ValidationConfig) -> Self {
        Self::new(loader)
            .with_skip_keys(config.skip_keys.iter().cloned())
            .with_value_matching(config.value_matching)
    }

    /// Keys tolerated in records even though no schema declares them
    pub fn with_skip_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_value_matching(mut self, matching: ValueMatching) -> Self {
        self.matching = matching;
        self
    }

    pub fn loader(&self) -> &Arc<SchemaLoader> {
        &self.loader
    }

    /// Load the schema at `schema_path` and validate `record` against it
    pub fn validate_path(&self, schema_path: &Path, record: &Record) -> Result<()> {
        let schema = self.loader.load(schema_path)?;
        self.validate(&schema, record)
    }

    /// Validate a record. The first failing key stops validation.
    pub fn validate(&self, schema: &Schema, record: &Record) -> Result<()> {
        let mut satisfied = BTreeSet::new();

        for (key, value) in record {
            let Some(def) = schema.get(key) else {
                if self.skip_keys.contains(key) {
                    continue;
                }
                return Err(ValidationError::UnknownKey { key: key.clone() });
            };

            if def.has_sub_schema() {
                self.check_struct(&schema.source_path, def, value)?;
            } else {
                self.check_field(def, value)?;
            }

            if def.is_mandatory() {
                satisfied.insert(key.as_str());
            }
        }

        let mandatory = schema.mandatory_keys();
        if satisfied.len() != mandatory.len() {
            let missing = mandatory
                .into_iter()
                .filter(|key| !satisfied.contains(key.as_str()))
                .collect();
            return Err(ValidationError::MissingMandatoryKeys { missing });
        }

        Ok(())
    }

    /// Validate a struct or list-of-struct value against the field's sub-schema.
    ///
    /// Keys of the value that the sub-schema does not declare are ignored, and
    /// mandatory sub-schema keys absent from the value are not reported.
    pub fn check_struct(
        &self,
        parent_schema_path: &Path,
        def: &SchemaFieldDefinition,
        value: &Value,
    ) -> Result<()> {
        let Some(reference) = def.nested_schema_ref.as_deref().filter(|r| !r.is_empty()) else {
            return self.check_field(def, value);
        };

        let sub_schema = self
            .loader
            .load_sub_schema(parent_schema_path, &def.key, reference)?;

        match value {
            Value::Map(map) => self.check_struct_fields(&sub_schema, map),
            Value::List(items)
                if def.is_list_type() && items.iter().all(|item| item.as_map().is_some()) =>
            {
                items
                    .iter()
                    .filter_map(Value::as_map)
                    .try_for_each(|map| self.check_struct_fields(&sub_schema, map))
            }
            other => Err(type_mismatch(def, other)),
        }
    }

    fn check_struct_fields(&self, sub_schema: &Schema, map: &BTreeMap<String, Value>) -> Result<()> {
        for (key, item) in map {
            let Some(sub_def) = sub_schema.get(key) else {
                continue;
            };

            if sub_def.has_sub_schema() {
                self.check_struct(&sub_schema.source_path, sub_def, item)?;
            } else {
                self.check_field(sub_def, item)?;
            }
        }
        Ok(())
    }

    fn check_field(&self, def: &SchemaFieldDefinition, value: &Value) -> Result<()> {
        if !check_type(def, value) {
            return Err(type_mismatch(def, value));
        }

        if !check_value(def, value, self.matching) {
            return Err(ValidationError::ValueMismatch {
                key: def.key.clone(),
                declared: def.declared_type.clone(),
                value: value.to_string(),
                allowed: def.allowed_value.to_string(),
            });
        }

        Ok(())
    }
}

fn type_mismatch(def: &SchemaFieldDefinition, value: &Value) -> ValidationError {
    ValidationError::TypeMismatch {
        key: def.key.clone(),
        declared: def.declared_type.clone(),
        actual: classify(value).to_string(),
        value: value.to_string(),
    }
}
