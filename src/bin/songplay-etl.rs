//! songplay-etl — load S3 event and song data into the Redshift star schema
//!
//! # Usage
//!
//! ```bash
//! # Load staging, then populate the fact and dimension tables
//! songplay-etl
//!
//! # Recreate every table first
//! songplay-etl --setup
//!
//! # Show the statements without connecting
//! songplay-etl --dry-run --format json
//! ```

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use colored::*;
use songplay_etl::config::CONFIG_ENV_VAR;
use songplay_etl::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "songplay-etl")]
#[command(version)]
#[command(about = "Stage S3 event and song data in Redshift and build the song-play star schema", long_about = None)]
#[command(after_help = "EXAMPLES:
    songplay-etl
    songplay-etl --config ./dwh.toml --setup
    songplay-etl --dry-run")]
struct Cli {
    /// Path to the TOML config (defaults to ./dwh.toml, then the user config dir)
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Drop and recreate every table before loading
    #[arg(long)]
    setup: bool,

    /// Don't connect, just show the statements in execution order
    #[arg(short, long)]
    dry_run: bool,

    /// Output format for --dry-run
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Verbose output (debug logging)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = execute(&cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "songplay_etl=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn execute(cli: &Cli) -> EtlResult<()> {
    let config = EtlConfig::load(cli.config.as_deref())?;
    let catalog = QueryCatalog::new(&config)?;

    if cli.dry_run {
        print_catalog(&catalog, cli.setup, &cli.format)?;
        return Ok(());
    }

    let summary = Pipeline::connect(&config.cluster)
        .await?
        .with_schema_reset(cli.setup)
        .run(&catalog)
        .await?;

    print_summary(&summary);
    Ok(())
}

fn print_catalog(catalog: &QueryCatalog, setup: bool, format: &OutputFormat) -> EtlResult<()> {
    let statements: Vec<&Statement> = catalog
        .phases()
        .into_iter()
        .filter(|(kind, _)| setup || matches!(kind, StatementKind::Copy | StatementKind::Insert))
        .flat_map(|(_, stmts)| stmts.iter())
        .collect();

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&statements)
                .map_err(|e| EtlError::Io(std::io::Error::other(e)))?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            println!("{}", "🔍 DRY-RUN MODE - Statements:".yellow().bold());
            for (i, stmt) in statements.iter().enumerate() {
                println!(
                    "\n{}{} {} {} {}",
                    "Statement ".dimmed(),
                    (i + 1).to_string().cyan(),
                    stmt.kind.to_string().green(),
                    stmt.table.name().white().bold(),
                    format!("({})", stmt.table.role()).dimmed()
                );
                println!("  {}", stmt.sql.white());
            }
            println!("\n{}", "No changes made.".yellow());
        }
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    for outcome in &summary.outcomes {
        println!(
            "  {} {:6} {:14} {:>10} rows  {:.2?}",
            "✓".green(),
            outcome.kind.to_string(),
            outcome.table.name(),
            outcome.rows_affected,
            outcome.elapsed
        );
    }
    println!(
        "{} Staged {} rows, inserted {} rows in {:.2?}",
        "✓".green(),
        summary.rows(StatementKind::Copy).to_string().cyan(),
        summary.rows(StatementKind::Insert).to_string().cyan(),
        summary.elapsed()
    );
}
