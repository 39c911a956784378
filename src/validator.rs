//! Batch validation engine
//!
//! Validates every record file found under a path against one schema:
//! - **Async I/O**: file discovery and record file reads run on tokio
//! - **Blocking work**: schema loads (through the cache) and record validation
//!   run in `spawn_blocking`
//! - **Bounded concurrency**: a semaphore caps the number of files in flight

use futures::future::try_join_all;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cache::SchemaCache;
use crate::config::{Config, ConfigManager};
use crate::error::{Result, ValidationError};
use crate::file_discovery::FileDiscovery;
use crate::record_validator::RecordValidator;
use crate::schema_loader::SchemaLoader;
use crate::value::{Record, Value};

/// Batch engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Number of record files validated concurrently
    pub max_concurrent_validations: usize,
    /// Skip remaining files once one file is invalid
    pub fail_fast: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_validations: num_cpus::get(),
            fail_fast: false,
        }
    }
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent_validations: ConfigManager::get_thread_count(config),
            fail_fast: config.validation.fail_fast,
        }
    }
}

/// Status of a single record file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    /// Every record in the file is valid
    Valid,
    /// Some records failed validation
    Invalid { error_count: usize },
    /// The file or the schema could not be processed
    Error { message: String },
    /// The file was not validated
    Skipped { reason: String },
}

impl ValidationStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationStatus::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationStatus::Invalid { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ValidationStatus::Error { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ValidationStatus::Skipped { .. })
    }
}

/// Result of validating a single record file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileValidationResult {
    pub path: PathBuf,
    pub status: ValidationStatus,
    /// Number of records decoded from the file
    pub record_count: usize,
    pub duration: Duration,
    /// One line per failing record
    pub error_details: Vec<String>,
}

impl FileValidationResult {
    pub fn valid(path: PathBuf, record_count: usize, duration: Duration) -> Self {
        Self {
            path,
            status: ValidationStatus::Valid,
            record_count,
            duration,
            error_details: Vec::new(),
        }
    }

    pub fn invalid(
        path: PathBuf,
        record_count: usize,
        duration: Duration,
        error_details: Vec<String>,
    ) -> Self {
        Self {
            path,
            status: ValidationStatus::Invalid {
                error_count: error_details.len(),
            },
            record_count,
            duration,
            error_details,
        }
    }

    pub fn error(path: PathBuf, error: ValidationError, duration: Duration) -> Self {
        Self {
            path,
            status: ValidationStatus::Error {
                message: error.to_string(),
            },
            record_count: 0,
            duration,
            error_details: vec![error.to_string()],
        }
    }

    pub fn skipped(path: PathBuf, reason: String, duration: Duration) -> Self {
        Self {
            path,
            status: ValidationStatus::Skipped {
                reason: reason.clone(),
            },
            record_count: 0,
            duration,
            error_details: vec![reason],
        }
    }
}

/// Performance metrics for a batch run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_duration: Duration,
    pub discovery_duration: Duration,
    pub schema_loading_duration: Duration,
    pub validation_duration: Duration,
    pub average_time_per_file: Duration,
    pub throughput_files_per_second: f64,
    pub concurrent_validations: usize,
    pub schema_cache_stats: SchemaCacheStats,
}

/// Schema cache statistics captured after a run
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchemaCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale: u64,
    pub schemas_cached: u64,
}

/// Aggregated results of validating multiple files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResults {
    pub total_files: usize,
    pub valid_files: usize,
    pub invalid_files: usize,
    pub error_files: usize,
    pub skipped_files: usize,
    /// Records decoded across all files
    pub total_records: usize,
    /// Records that failed validation
    pub invalid_records: usize,
    pub total_duration: Duration,
    pub average_duration: Duration,
    pub file_results: Vec<FileValidationResult>,
    pub performance_metrics: PerformanceMetrics,
}

impl ValidationResults {
    /// Aggregate individual file results into summary
    pub fn aggregate(file_results: Vec<FileValidationResult>) -> Self {
        let total_files = file_results.len();
        let mut valid_files = 0;
        let mut invalid_files = 0;
        let mut error_files = 0;
        let mut skipped_files = 0;
        let mut total_records = 0;
        let mut invalid_records = 0;
        let mut total_duration = Duration::ZERO;

        for result in &file_results {
            match result.status {
                ValidationStatus::Valid => valid_files += 1,
                ValidationStatus::Invalid { error_count } => {
                    invalid_files += 1;
                    invalid_records += error_count;
                }
                ValidationStatus::Error { .. } => error_files += 1,
                ValidationStatus::Skipped { .. } => skipped_files += 1,
            }

            total_records += result.record_count;
            total_duration += result.duration;
        }

        let average_duration = if total_files > 0 {
            total_duration / total_files as u32
        } else {
            Duration::ZERO
        };

        let performance_metrics = PerformanceMetrics {
            total_duration,
            validation_duration: total_duration,
            average_time_per_file: average_duration,
            throughput_files_per_second: if total_duration.as_secs_f64() > 0.0 {
                total_files as f64 / total_duration.as_secs_f64()
            } else {
                0.0
            },
            concurrent_validations: 1,
            ..PerformanceMetrics::default()
        };

        Self {
            total_files,
            valid_files,
            invalid_files,
            error_files,
            skipped_files,
            total_records,
            invalid_records,
            total_duration,
            average_duration,
            file_results,
            performance_metrics,
        }
    }

    pub fn with_metrics(
        file_results: Vec<FileValidationResult>,
        performance_metrics: PerformanceMetrics,
    ) -> Self {
        let mut results = Self::aggregate(file_results);
        results.total_duration = performance_metrics.total_duration;
        results.performance_metrics = performance_metrics;
        results
    }

    /// Check if all files validated successfully
    pub fn all_valid(&self) -> bool {
        self.valid_files == self.total_files && self.total_files > 0
    }

    pub fn has_errors(&self) -> bool {
        self.error_files > 0 || self.invalid_files > 0
    }

    /// Get success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.valid_files as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Decode a record file into records.
///
/// A file holds either one mapping or a list of mappings.
pub fn decode_records(path: &Path, content: &str) -> Result<Vec<Record>> {
    let parse_error = |details: String| ValidationError::RecordParse {
        file: path.to_path_buf(),
        details,
    };

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let decoded = match extension.as_str() {
        "json" => serde_json::from_str::<serde_json::Value>(content)
            .map(Value::from)
            .map_err(|e| parse_error(e.to_string()))?,
        "yaml" | "yml" => serde_yaml::from_str::<serde_yaml::Value>(content)
            .map(Value::from)
            .map_err(|e| parse_error(e.to_string()))?,
        other => {
            return Err(parse_error(format!(
                "unsupported record file extension '{}'",
                other
            )));
        }
    };

    match decoded {
        Value::Map(record) => Ok(vec![record]),
        Value::List(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Map(record) => Ok(record),
                other => Err(parse_error(format!(
                    "element {} is {}, expected a mapping",
                    index,
                    crate::value::classify(&other)
                ))),
            })
            .collect(),
        Value::Null => Err(parse_error("file contains no records".to_string())),
        other => Err(parse_error(format!(
            "expected a mapping or a list of mappings, found {}",
            crate::value::classify(&other)
        ))),
    }
}

/// Drop schema files that sit among the discovered record files
fn exclude_schema_files(schema_files: &BTreeSet<PathBuf>, files: Vec<PathBuf>) -> Vec<PathBuf> {
    files
        .into_iter()
        .filter(|file| {
            let canonical = std::fs::canonicalize(file).unwrap_or_else(|_| file.clone());
            !schema_files.contains(&canonical)
        })
        .collect()
}

/// Concurrent validation engine for record files
pub struct ValidationEngine {
    validator: Arc<RecordValidator>,
    schema_path: PathBuf,
    config: EngineConfig,
}

impl ValidationEngine {
    pub fn new(validator: Arc<RecordValidator>, schema_path: PathBuf, config: EngineConfig) -> Self {
        Self {
            validator,
            schema_path,
            config,
        }
    }

    /// Wire cache, loader and record validator from application configuration
    pub fn from_config(config: &Config, schema_path: PathBuf) -> Self {
        let cache = Arc::new(SchemaCache::new(&config.cache));
        let loader = Arc::new(SchemaLoader::from_config(cache, &config.schema));
        let validator = Arc::new(RecordValidator::from_config(loader, &config.validation));

        Self::new(validator, schema_path, EngineConfig::from_config(config))
    }

    /// Schema, include and sub-schema files making up the engine's schema.
    /// Loading them up front surfaces setup problems before any record is read.
    pub async fn schema_files(&self) -> Result<BTreeSet<PathBuf>> {
        let validator = Arc::clone(&self.validator);
        let schema_path = self.schema_path.clone();

        tokio::task::spawn_blocking(move || validator.loader().schema_files(&schema_path))
            .await
            .map_err(|e| ValidationError::Concurrency {
                details: format!("Join error: {}", e),
            })?
    }

    /// Validate record files at a path (directory or file)
    pub async fn validate_path(
        &self,
        path: &Path,
        file_discovery: &FileDiscovery,
    ) -> Result<ValidationResults> {
        let workflow_start = Instant::now();
        let mut performance_metrics = PerformanceMetrics {
            concurrent_validations: self.config.max_concurrent_validations,
            ..PerformanceMetrics::default()
        };

        let schema_start = Instant::now();
        let schema_files = self.schema_files().await?;
        performance_metrics.schema_loading_duration = schema_start.elapsed();

        let discovery_start = Instant::now();
        let discovery = file_discovery.discover(path).await?;
        let files = exclude_schema_files(&schema_files, discovery.files);
        performance_metrics.discovery_duration = discovery_start.elapsed();
        tracing::info!(
            files = files.len(),
            unreadable = discovery.errors,
            path = %path.display(),
            "discovered record files"
        );

        let validation_start = Instant::now();
        let results = self.validate_files(files).await?;
        performance_metrics.validation_duration = validation_start.elapsed();

        performance_metrics.schema_cache_stats = self.collect_cache_statistics();
        performance_metrics.total_duration = workflow_start.elapsed();
        performance_metrics.average_time_per_file = if !results.is_empty() {
            performance_metrics.validation_duration / results.len() as u32
        } else {
            Duration::ZERO
        };
        performance_metrics.throughput_files_per_second =
            if performance_metrics.total_duration.as_secs_f64() > 0.0 {
                results.len() as f64 / performance_metrics.total_duration.as_secs_f64()
            } else {
                0.0
            };

        let final_results = ValidationResults::with_metrics(results, performance_metrics);
        tracing::info!(
            total = final_results.total_files,
            valid = final_results.valid_files,
            invalid = final_results.invalid_files,
            errors = final_results.error_files,
            "validation finished"
        );

        Ok(final_results)
    }

    /// Validate a list of record files concurrently
    pub async fn validate_files(&self, files: Vec<PathBuf>) -> Result<Vec<FileValidationResult>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let semaphore = Arc::new(tokio::sync::Semaphore::new(
            self.config.max_concurrent_validations.max(1),
        ));
        let stop = Arc::new(AtomicBool::new(false));

        let validation_tasks: Vec<_> = files
            .into_iter()
            .map(|file_path| {
                let validator = Arc::clone(&self.validator);
                let schema_path = self.schema_path.clone();
                let semaphore = Arc::clone(&semaphore);
                let stop = Arc::clone(&stop);
                let fail_fast = self.config.fail_fast;

                tokio::spawn(async move {
                    let _permit = semaphore.acquire().await.map_err(|_| {
                        ValidationError::Concurrency {
                            details: "Failed to acquire validation semaphore".to_string(),
                        }
                    })?;

                    if stop.load(Ordering::SeqCst) {
                        return Ok(FileValidationResult::skipped(
                            file_path,
                            "skipped after an earlier failure (fail-fast)".to_string(),
                            Duration::ZERO,
                        ));
                    }

                    let result =
                        Self::validate_single_file_internal(file_path, schema_path, validator)
                            .await;

                    if fail_fast && !result.status.is_valid() {
                        stop.store(true, Ordering::SeqCst);
                    }

                    Ok::<FileValidationResult, ValidationError>(result)
                })
            })
            .collect();

        let task_results =
            try_join_all(validation_tasks)
                .await
                .map_err(|e| ValidationError::Concurrency {
                    details: format!("Task join error: {}", e),
                })?;

        task_results.into_iter().collect()
    }

    async fn validate_single_file_internal(
        file_path: PathBuf,
        schema_path: PathBuf,
        validator: Arc<RecordValidator>,
    ) -> FileValidationResult {
        let start_time = Instant::now();

        let content = match tokio::fs::read_to_string(&file_path).await {
            Ok(content) => content,
            Err(e) => {
                return FileValidationResult::error(file_path, e.into(), start_time.elapsed());
            }
        };

        let records = match decode_records(&file_path, &content) {
            Ok(records) if records.is_empty() => {
                return FileValidationResult::skipped(
                    file_path,
                    "file contains no records".to_string(),
                    start_time.elapsed(),
                );
            }
            Ok(records) => records,
            Err(e) => return FileValidationResult::error(file_path, e, start_time.elapsed()),
        };

        let record_count = records.len();
        let outcome = tokio::task::spawn_blocking(move || {
            // Each file goes through the cache so renewal applies mid-run
            let schema = validator.loader().load(&schema_path)?;
            let failures: Vec<String> = records
                .iter()
                .enumerate()
                .filter_map(|(index, record)| {
                    validator
                        .validate(&schema, record)
                        .err()
                        .map(|e| format!("record {}: {}", index, e))
                })
                .collect();
            Ok::<_, ValidationError>(failures)
        })
        .await;

        let duration = start_time.elapsed();

        match outcome {
            Ok(Ok(failures)) if failures.is_empty() => {
                tracing::debug!(path = %file_path.display(), records = record_count, "record file is valid");
                FileValidationResult::valid(file_path, record_count, duration)
            }
            Ok(Ok(failures)) => {
                tracing::debug!(
                    path = %file_path.display(),
                    failures = failures.len(),
                    "record file is invalid"
                );
                FileValidationResult::invalid(file_path, record_count, duration, failures)
            }
            Ok(Err(e)) => FileValidationResult::error(file_path, e, duration),
            Err(e) => FileValidationResult::error(
                file_path,
                ValidationError::Concurrency {
                    details: format!("Join error: {}", e),
                },
                duration,
            ),
        }
    }

    /// Validate a single record file
    pub async fn validate_single_file(&self, file_path: &Path) -> FileValidationResult {
        Self::validate_single_file_internal(
            file_path.to_path_buf(),
            self.schema_path.clone(),
            Arc::clone(&self.validator),
        )
        .await
    }

    pub fn validator(&self) -> &Arc<RecordValidator> {
        &self.validator
    }

    pub fn schema_path(&self) -> &Path {
        &self.schema_path
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn collect_cache_statistics(&self) -> SchemaCacheStats {
        let stats = self.validator.loader().cache().stats();
        SchemaCacheStats {
            hits: stats.hits,
            misses: stats.misses,
            stale: stats.stale,
            schemas_cached: stats.entry_count,
        }
    }
}
