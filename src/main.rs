use std::process::ExitCode;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use validate_metadata::{
    Cli, ConfigManager, FileDiscovery, Output, ValidationEngine, VerbosityLevel,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let default_level = if cli.verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether every record file validated
async fn run(cli: &Cli) -> anyhow::Result<bool> {
    cli.validate().map_err(anyhow::Error::msg)?;

    let config = ConfigManager::load_config(cli)
        .await
        .context("failed to load configuration")?;
    tracing::debug!(?config, "effective configuration");

    let discovery = FileDiscovery::from_config(&config.files)?;
    let engine = ValidationEngine::from_config(&config, cli.schema.clone());

    let results = engine
        .validate_path(&cli.path, &discovery)
        .await
        .with_context(|| format!("failed to validate {}", cli.path.display()))?;

    let output = Output::new(VerbosityLevel::from_flags(
        config.output.verbose,
        config.output.quiet,
    ))
    .with_format(config.output.format.into());

    let rendered = output.render(&results)?;
    if !rendered.is_empty() {
        println!("{}", rendered.trim_end());
    }

    Ok(!results.has_errors())
}
