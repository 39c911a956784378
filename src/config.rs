use crate::cli::{Cli, OutputFormat};
use crate::rules::ValueMatching;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Prefix shared by every environment variable override
const ENV_PREFIX: &str = "VALIDATE_METADATA_";

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub validation: ValidationConfig,
    pub cache: CacheConfig,
    pub schema: SchemaConfig,
    pub output: OutputConfig,
    pub files: FileConfig,
}

/// Record validation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ValidationConfig {
    /// Number of concurrent validation tasks
    pub threads: Option<usize>,
    /// Stop after the first record file that fails
    pub fail_fast: bool,
    /// Record keys ignored when the schema does not declare them
    pub skip_keys: Vec<String>,
    /// How allowed values are matched
    pub value_matching: ValueMatching,
}

/// Schema cache settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds a loaded schema is served before it is reloaded; zero reloads on every lookup
    pub renewal_interval_seconds: u64,
    /// Maximum number of schemas held in memory
    pub max_entries: u64,
}

/// Schema loading settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchemaConfig {
    /// JSON file mapping UI section names to ordered field keys
    pub web_sections_file: Option<PathBuf>,
    /// Maximum depth of nested schema file includes
    pub max_include_depth: usize,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormatConfig,
    pub verbose: bool,
    /// Quiet mode (errors only)
    pub quiet: bool,
}

/// Record file discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    /// Record file extensions to process
    pub extensions: Vec<String>,
    /// Include patterns (glob syntax)
    pub include_patterns: Vec<String>,
    /// Exclude patterns (glob syntax)
    pub exclude_patterns: Vec<String>,
    /// Maximum directory depth below the scanned path (unlimited when unset)
    pub max_depth: Option<usize>,
    pub follow_symlinks: bool,
}

/// Output format configuration (serializable version of CLI OutputFormat)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormatConfig {
    #[default]
    Human,
    Json,
    Summary,
}

impl From<OutputFormat> for OutputFormatConfig {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Human => OutputFormatConfig::Human,
            OutputFormat::Json => OutputFormatConfig::Json,
            OutputFormat::Summary => OutputFormatConfig::Summary,
        }
    }
}

impl From<OutputFormatConfig> for OutputFormat {
    fn from(format: OutputFormatConfig) -> Self {
        match format {
            OutputFormatConfig::Human => OutputFormat::Human,
            OutputFormatConfig::Json => OutputFormat::Json,
            OutputFormatConfig::Summary => OutputFormat::Summary,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            renewal_interval_seconds: 3600,
            max_entries: 1000,
        }
    }
}

impl CacheConfig {
    pub fn renewal_interval(&self) -> Duration {
        Duration::from_secs(self.renewal_interval_seconds)
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            web_sections_file: None,
            max_include_depth: 16,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormatConfig::Human,
            verbose: false,
            quiet: false,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["json".to_string(), "yaml".to_string(), "yml".to_string()],
            include_patterns: vec![],
            exclude_patterns: vec![],
            max_depth: None,
            follow_symlinks: false,
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = &cli.config {
            config = Self::load_from_file(config_path).await?;
        } else if let Some(found_config) = Self::find_config_file().await? {
            config = found_config;
        }

        config = Self::apply_environment_overrides(config)?;
        config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub async fn find_config_file() -> Result<Option<Config>> {
        let config_names = [
            "validate-metadata.toml",
            "validate-metadata.json",
            ".validate-metadata.toml",
            ".validate-metadata.json",
        ];

        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                tracing::debug!(path = %path.display(), "using configuration file");
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("validate-metadata");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    tracing::debug!(path = %path.display(), "using configuration file");
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        if let Some(threads) = env_var(env, "THREADS") {
            config.validation.threads = Some(parse_env("THREADS", &threads)?);
        }

        if let Some(fail_fast) = env_var(env, "FAIL_FAST") {
            config.validation.fail_fast = parse_env("FAIL_FAST", &fail_fast)?;
        }

        if let Some(skip_keys) = env_var(env, "SKIP_KEYS") {
            config.validation.skip_keys = split_list(&skip_keys);
        }

        if let Some(matching) = env_var(env, "VALUE_MATCHING") {
            config.validation.value_matching = match matching.to_lowercase().as_str() {
                "exact" => ValueMatching::Exact,
                "wildcard" => ValueMatching::Wildcard,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid {}VALUE_MATCHING value: {}",
                        ENV_PREFIX, matching
                    )));
                }
            };
        }

        if let Some(interval) = env_var(env, "RENEWAL_INTERVAL") {
            config.cache.renewal_interval_seconds = parse_env("RENEWAL_INTERVAL", &interval)?;
        }

        if let Some(max_entries) = env_var(env, "CACHE_MAX_ENTRIES") {
            config.cache.max_entries = parse_env("CACHE_MAX_ENTRIES", &max_entries)?;
        }

        if let Some(web_sections) = env_var(env, "WEB_SECTIONS") {
            config.schema.web_sections_file = Some(PathBuf::from(web_sections));
        }

        if let Some(depth) = env_var(env, "MAX_INCLUDE_DEPTH") {
            config.schema.max_include_depth = parse_env("MAX_INCLUDE_DEPTH", &depth)?;
        }

        if let Some(verbose) = env_var(env, "VERBOSE") {
            config.output.verbose = parse_env("VERBOSE", &verbose)?;
        }

        if let Some(quiet) = env_var(env, "QUIET") {
            config.output.quiet = parse_env("QUIET", &quiet)?;
        }

        if let Some(format) = env_var(env, "FORMAT") {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormatConfig::Human,
                "json" => OutputFormatConfig::Json,
                "summary" => OutputFormatConfig::Summary,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid {}FORMAT value: {}",
                        ENV_PREFIX, format
                    )));
                }
            };
        }

        if let Some(extensions) = env_var(env, "EXTENSIONS") {
            config.files.extensions = split_list(&extensions);
        }

        if let Some(depth) = env_var(env, "MAX_DEPTH") {
            config.files.max_depth = Some(parse_env("MAX_DEPTH", &depth)?);
        }

        if let Some(follow) = env_var(env, "FOLLOW_SYMLINKS") {
            config.files.follow_symlinks = parse_env("FOLLOW_SYMLINKS", &follow)?;
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence when given)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if cli.threads.is_some() {
            config.validation.threads = cli.threads;
        }
        if cli.fail_fast {
            config.validation.fail_fast = true;
        }
        if let Some(skip_keys) = &cli.skip_keys {
            config.validation.skip_keys = split_list(skip_keys);
        }
        if cli.wildcard {
            config.validation.value_matching = ValueMatching::Wildcard;
        }

        if let Some(interval) = cli.renewal_interval {
            config.cache.renewal_interval_seconds = interval;
        }

        if let Some(web_sections) = &cli.web_sections {
            config.schema.web_sections_file = Some(web_sections.clone());
        }

        if let Some(format) = cli.format {
            config.output.format = format.into();
        }
        if cli.verbose {
            config.output.verbose = true;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        }

        if let Some(extensions) = cli.get_extensions() {
            config.files.extensions = extensions;
        }
        if !cli.include_patterns.is_empty() {
            config.files.include_patterns = cli.include_patterns.clone();
        }
        if !cli.exclude_patterns.is_empty() {
            config.files.exclude_patterns = cli.exclude_patterns.clone();
        }
        if cli.max_depth.is_some() {
            config.files.max_depth = cli.max_depth;
        }
        if cli.follow_symlinks {
            config.files.follow_symlinks = true;
        }

        config
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if let Some(threads) = config.validation.threads {
            if threads == 0 {
                return Err(ConfigError::Validation(
                    "Number of threads must be greater than 0".to_string(),
                ));
            }
            if threads > 1000 {
                return Err(ConfigError::Validation(
                    "Number of threads cannot exceed 1000".to_string(),
                ));
            }
        }

        if config.cache.max_entries == 0 {
            return Err(ConfigError::Validation(
                "Cache max entries must be greater than 0".to_string(),
            ));
        }

        if config.schema.max_include_depth == 0 {
            return Err(ConfigError::Validation(
                "Maximum include depth must be greater than 0".to_string(),
            ));
        }

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        if config.files.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "At least one file extension must be specified".to_string(),
            ));
        }

        for ext in &config.files.extensions {
            if ext.contains('/') || ext.contains('\\') || ext.contains('.') {
                return Err(ConfigError::Validation(format!(
                    "Invalid file extension: {}",
                    ext
                )));
            }
        }

        if config.validation.skip_keys.iter().any(|key| key.is_empty()) {
            return Err(ConfigError::Validation(
                "Skip keys cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the effective thread count
    pub fn get_thread_count(config: &Config) -> usize {
        config.validation.threads.unwrap_or_else(num_cpus::get)
    }
}

fn env_var(env: &impl EnvProvider, name: &str) -> Option<String> {
    env.get(&format!("{}{}", ENV_PREFIX, name))
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        ConfigError::Environment(format!("Invalid {}{} value: {}", ENV_PREFIX, name, raw))
    })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
