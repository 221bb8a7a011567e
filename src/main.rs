//! CLI entry point for threatlens.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use serde_json::Value;
use std::io::{self, Read, Write};
use std::path::Path;
use threatlens::{
    cli::{Cli, Commands},
    config::{generate_default_config, Config},
    reporters::{report, report_health, report_modules, OutputFormat},
    server, ErrorReason, EventBus, SecurityAnalyzer, ThreatLevel,
};
use tracing_subscriber::EnvFilter;

const EXIT_THREAT: i32 = 1;
const EXIT_ANALYSIS_ERROR: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for reports
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_level.into()))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let mut config = if let Some(ref config_path) = cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()
    };

    let format: OutputFormat = cli.format.parse().map_err(|e| anyhow::anyhow!("{}", e))?;

    match cli.command {
        Commands::Serve { bind, preload } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if preload {
                config.analyzers.preload = true;
            }

            let analyzer = SecurityAnalyzer::from_config(&config.analyzers)?
                .with_events(EventBus::new(config.server.feed_capacity));
            server::serve(&config.server, analyzer).await?;
        }

        Commands::Analyze {
            module,
            input,
            data,
            fail_on,
        } => {
            let fail_on: Option<ThreatLevel> = fail_on
                .map(|level| level.parse())
                .transpose()
                .map_err(|e| anyhow::anyhow!("{}", e))?;

            let raw = read_request(input.as_deref(), data)?;
            let analyzer = SecurityAnalyzer::from_config(&config.analyzers)?;
            let key = server::resolve_module(&module);
            let result = match serde_json::from_str::<Value>(&raw) {
                Ok(request) => analyzer.run_analysis(key, &request),
                Err(e) => analyzer.reject(
                    key,
                    ErrorReason::InvalidInput,
                    format!("request is not valid JSON: {}", e),
                ),
            };

            let mut stdout = io::stdout().lock();
            report(&result, format, &mut stdout)?;
            stdout.flush()?;

            if !result.is_ok() {
                std::process::exit(EXIT_ANALYSIS_ERROR);
            }
            if let (Some(threshold), Some(level)) = (fail_on, result.threat_level) {
                if level >= threshold {
                    std::process::exit(EXIT_THREAT);
                }
            }
        }

        Commands::List { json } => {
            let analyzer = SecurityAnalyzer::from_config(&config.analyzers)?;
            let mut stdout = io::stdout().lock();
            report_modules(&analyzer.modules(), json || format == OutputFormat::Json, &mut stdout)?;
        }

        Commands::Health => {
            let analyzer = SecurityAnalyzer::from_config(&config.analyzers)?;
            let health = analyzer.health();
            let mut stdout = io::stdout().lock();
            report_health(&health, format, &mut stdout)?;
            stdout.flush()?;
            if !health.healthy {
                std::process::exit(EXIT_ANALYSIS_ERROR);
            }
        }

        Commands::Init { output } => {
            if output.exists() {
                eprintln!(
                    "{}",
                    format!("Config file already exists: {}", output.display()).yellow()
                );
                eprintln!("Use a different path or remove the existing file.");
                std::process::exit(1);
            }

            std::fs::write(&output, generate_default_config()?)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!(
                "{}",
                format!("Created config file: {}", output.display()).green()
            );
            println!("Edit this file to tune analyzer thresholds and enabled modules.");
        }
    }

    Ok(())
}

/// Read the raw analysis request from `--input`, `--data` or stdin.
fn read_request(input: Option<&Path>, data: Option<String>) -> Result<String> {
    let raw = match (input, data) {
        (Some(path), _) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read request file {}", path.display()))?,
        (None, Some(data)) => data,
        (None, None) => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read request from stdin")?;
            buf
        }
    };
    Ok(raw)
}
