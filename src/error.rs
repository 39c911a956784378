use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Main error type covering schema loading and record validation failures
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema read error: {path} - {source}")]
    SchemaRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema parsing error: {path} - {details}")]
    SchemaParse { path: PathBuf, details: String },

    #[error("Unsupported schema format: {path} (extension '{extension}')")]
    SchemaFormat { path: PathBuf, extension: String },

    #[error("Schema include cycle detected at {path}")]
    SchemaCycle { path: PathBuf },

    #[error("Unknown key: {key}")]
    UnknownKey { key: String },

    #[error("Type mismatch for key '{key}': expected {declared}, got {actual} (value {value})")]
    TypeMismatch {
        key: String,
        declared: String,
        actual: String,
        value: String,
    },

    #[error("Value mismatch for key '{key}' of type {declared}: {value} is not one of {allowed}")]
    ValueMismatch {
        key: String,
        declared: String,
        value: String,
        allowed: String,
    },

    #[error("Sub-schema load failed for key '{key}': {path} - {details}")]
    SubSchemaLoad {
        key: String,
        path: PathBuf,
        details: String,
    },

    #[error("Missing mandatory keys: {}", missing.join(", "))]
    MissingMandatoryKeys { missing: Vec<String> },

    #[error("Record parsing error: {file} - {details}")]
    RecordParse { file: PathBuf, details: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Concurrent operation error: {details}")]
    Concurrency { details: String },
}

impl ValidationError {
    /// True for failures caused by the record content rather than by the
    /// schema or the environment.
    pub fn is_record_failure(&self) -> bool {
        matches!(
            self,
            ValidationError::UnknownKey { .. }
                | ValidationError::TypeMismatch { .. }
                | ValidationError::ValueMismatch { .. }
                | ValidationError::MissingMandatoryKeys { .. }
        )
    }

    /// True for failures raised while reading or parsing schema sources.
    pub fn is_schema_failure(&self) -> bool {
        matches!(
            self,
            ValidationError::SchemaRead { .. }
                | ValidationError::SchemaParse { .. }
                | ValidationError::SchemaFormat { .. }
                | ValidationError::SchemaCycle { .. }
                | ValidationError::SubSchemaLoad { .. }
        )
    }
}

impl From<ConfigError> for ValidationError {
    fn from(err: ConfigError) -> Self {
        ValidationError::Config(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ValidationError>;
