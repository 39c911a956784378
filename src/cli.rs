use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show failures
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show every record file
    Verbose,
}

impl VerbosityLevel {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            VerbosityLevel::Quiet
        } else if verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Report formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Per-file lines followed by a summary
    Human,
    /// Machine-readable JSON report
    Json,
    /// Summary counts only
    Summary,
}

/// Schema-driven metadata record validator
#[derive(Parser, Debug, Clone)]
#[command(name = "validate-metadata")]
#[command(about = "Validate metadata records (JSON/YAML) against a declarative schema")]
#[command(version)]
pub struct Cli {
    /// Schema file (.json, .yaml or .yml)
    #[arg(help = "Schema file describing the allowed record keys")]
    pub schema: PathBuf,

    /// Record file or directory to validate
    #[arg(help = "Record file or directory of record files")]
    pub path: PathBuf,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Record file extensions to process (comma-separated)
    #[arg(
        short = 'e',
        long = "extensions",
        help = "Record file extensions to process (e.g., 'json,yaml')"
    )]
    pub extensions: Option<String>,

    /// Number of concurrent validation tasks
    #[arg(
        short = 't',
        long = "threads",
        help = "Number of concurrent validation tasks"
    )]
    pub threads: Option<usize>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    /// Report format
    #[arg(short = 'f', long = "format", value_enum)]
    pub format: Option<OutputFormat>,

    /// Seconds a cached schema is reused before reloading (0 reloads every time)
    #[arg(long = "renewal-interval")]
    pub renewal_interval: Option<u64>,

    /// Record keys ignored when the schema does not declare them (comma-separated)
    #[arg(long = "skip-keys")]
    pub skip_keys: Option<String>,

    /// JSON file mapping UI sections to schema keys
    #[arg(long = "web-sections")]
    pub web_sections: Option<PathBuf>,

    /// Treat `*` in allowed values as a wildcard
    #[arg(long = "wildcard")]
    pub wildcard: bool,

    /// Include file patterns (glob syntax)
    #[arg(long = "include", action = clap::ArgAction::Append)]
    pub include_patterns: Vec<String>,

    /// Exclude file patterns (glob syntax)
    #[arg(long = "exclude", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Maximum directory depth to descend below PATH
    #[arg(long = "max-depth")]
    pub max_depth: Option<usize>,

    /// Descend into symlinked files and directories
    #[arg(long = "follow-symlinks")]
    pub follow_symlinks: bool,

    /// Stop after the first invalid record file
    #[arg(long = "fail-fast")]
    pub fail_fast: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Extensions given on the command line, if any
    pub fn get_extensions(&self) -> Option<Vec<String>> {
        let extensions: Vec<String> = self
            .extensions
            .as_deref()?
            .split(',')
            .map(|s| s.trim().trim_start_matches('.').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        if extensions.is_empty() {
            None
        } else {
            Some(extensions)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.schema.is_file() {
            return Err(format!("Schema file does not exist: {}", self.schema.display()));
        }
        if !self.path.exists() {
            return Err(format!("Path does not exist: {}", self.path.display()));
        }
        if let Some(threads) = self.threads
            && threads == 0
        {
            return Err("Number of threads must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        VerbosityLevel::from_flags(self.verbose, self.quiet)
    }
}
