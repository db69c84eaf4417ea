use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{Attribute, Cell, Table};
use owo_colors::OwoColorize;
use research_aggregator::config::{find_config_file, load_config, Config, LogFormat, ENV_VARS};
use research_aggregator::models::{FailureKind, SearchFailure, SearchOutcome, SearchSuccess};
use research_aggregator::{Orchestrator, Strategy};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Research Aggregator - Search academic paper metadata across multiple providers
#[derive(Parser, Debug)]
#[command(name = "research-aggregator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Search academic paper metadata across multiple providers", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search all configured providers
    Search {
        /// Search terms
        query: String,

        /// Maximum number of papers (defaults to search.default_limit)
        #[arg(long, short)]
        limit: Option<usize>,

        /// Provider execution strategy (defaults to search.strategy)
        #[arg(long, short)]
        strategy: Option<Strategy>,

        /// Output format
        #[arg(long, short, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Neither read nor populate the result cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Report the availability of every configured provider
    Health {
        /// Output format
        #[arg(long, short, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// List supported environment variables and show the effective configuration
    Env,
}

/// Output format for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Table format (human-readable)
    Table,
    /// JSON format (machine-readable)
    Json,
}

const EXIT_AGGREGATE_FAILURE: u8 = 1;
const EXIT_VALIDATION_FAILURE: u8 = 2;

fn init_tracing(cli: &Cli, config: &Config) {
    let level = if cli.quiet {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => config.logging.level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("research_aggregator={}", level)));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json || config.logging.format == LogFormat::Json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let path = cli.config.clone().or_else(find_config_file);
    let config = load_config(path.as_deref()).with_context(|| match &path {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load config from environment".to_string(),
    })?;
    Ok(config)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

fn print_success(success: &SearchSuccess) {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Title", "First author", "Date", "Source"]);

    for paper in &success.papers {
        table.add_row(vec![
            Cell::new(truncate(&paper.title, 60)).add_attribute(Attribute::Bold),
            Cell::new(truncate(paper.first_author().unwrap_or("-"), 30)),
            Cell::new(paper.date_key()),
            Cell::new(paper.source.to_string()),
        ]);
    }
    println!("{table}");

    let origin = if success.cached { " (cached)" } else { "" };
    println!(
        "{} {} papers from {}{}",
        "✓".green(),
        success.papers.len(),
        if success.sources_used.is_empty() {
            "no provider".to_string()
        } else {
            success.sources_used.join(", ")
        },
        origin.dimmed()
    );
    for failed in &success.failed_sources {
        println!("{} {}: {}", "⚠".yellow(), failed.source, failed.error.dimmed());
    }
}

fn print_failure(failure: &SearchFailure) {
    eprintln!("{} {}", "✗".red(), failure.message.bold());
    for error in &failure.source_errors {
        eprintln!("  {}: {}", error.source, error.error.dimmed());
    }
    if !failure.suggestions.is_empty() {
        eprintln!("Suggestions:");
        for suggestion in &failure.suggestions {
            eprintln!("  - {}", suggestion);
        }
    }
}

fn print_env(config: &Config) -> Result<()> {
    println!("{}", "Environment Variables".bold());
    for (name, description) in ENV_VARS {
        println!("  {:<52} {}", name, description);
    }
    println!();
    println!("{}", "Effective configuration".bold());
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = resolve_config(&cli)?;
    init_tracing(&cli, &config);

    match cli.command {
        Commands::Search {
            query,
            limit,
            strategy,
            format,
            no_cache,
        } => {
            if let Some(strategy) = strategy {
                config.search.strategy = strategy;
            }
            if no_cache {
                config.cache.enabled = false;
            }
            let limit = limit.unwrap_or(config.search.default_limit);

            let orchestrator = Orchestrator::from_config(&config)?;
            let outcome = orchestrator.search(&query, limit).await;

            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            }

            match outcome {
                SearchOutcome::Success(success) => {
                    if format == OutputFormat::Table {
                        print_success(&success);
                    }
                    Ok(ExitCode::SUCCESS)
                }
                SearchOutcome::Failure(failure) => {
                    if format == OutputFormat::Table {
                        print_failure(&failure);
                    }
                    let code = match failure.kind {
                        FailureKind::Validation => EXIT_VALIDATION_FAILURE,
                        FailureKind::AllSourcesFailed => EXIT_AGGREGATE_FAILURE,
                    };
                    Ok(ExitCode::from(code))
                }
            }
        }
        Commands::Health { format } => {
            let orchestrator = Orchestrator::from_config(&config)?;
            let health = orchestrator.health_check().await;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&health)?),
                OutputFormat::Table => {
                    let mut table = Table::new();
                    table.load_preset(comfy_table::presets::UTF8_FULL);
                    table.set_header(vec!["Source", "Status"]);
                    for (source, status) in &health {
                        table.add_row(vec![Cell::new(source), Cell::new(status)]);
                    }
                    println!("{table}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Env => {
            print_env(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
