//! # validate-metadata
//!
//! Schema-driven validation of metadata records. Schemas are JSON or YAML
//! lists of field definitions (key, declared type, optional flag, allowed
//! values, nested sub-schemas); records are key/value mappings decoded from
//! JSON or YAML. Loaded schemas are kept in a time-based cache and reloaded
//! once their renewal interval has passed.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod file_discovery;
pub mod output;
pub mod record_validator;
pub mod rules;
pub mod schema;
pub mod schema_loader;
pub mod validator;
pub mod value;

pub use cache::{CacheEntry, CacheStats, SchemaCache};
pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{Config, ConfigError, ConfigManager};
pub use error::{Result, ValidationError};
pub use file_discovery::{Discovery, FileDiscovery};
pub use output::Output;
pub use record_validator::RecordValidator;
pub use rules::{ValueMatching, check_type, check_value, normalize_type};
pub use schema::{Schema, SchemaFieldDefinition};
pub use schema_loader::{SchemaFormat, SchemaLoader};
pub use validator::{
    EngineConfig, FileValidationResult, PerformanceMetrics, SchemaCacheStats, ValidationEngine,
    ValidationResults, ValidationStatus, decode_records,
};
pub use value::{Record, Value, classify};
