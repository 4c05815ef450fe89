//! aucyber CLI - drive the Australian cyber incident pipeline
//!
//! # Usage
//!
//! ```bash
//! # Discover raw events for a window
//! aucyber discover --start 2024-01-01 --end 2024-06-30
//!
//! # Enrich pending raw events
//! aucyber enrich --limit 50
//!
//! # Build the canonical tier
//! aucyber dedupe
//!
//! # Month-by-month backfill (skips completed months)
//! aucyber backfill --start-month 2023-01 --end-month 2023-12
//!
//! # Repair out-of-policy record counts
//! aucyber fix-records --dry-run
//!
//! # Export the corpus
//! aucyber export --format xlsx --output events.xlsx
//! ```
//!
//! Exit codes: 0 success, 1 recoverable error, 2 configuration error,
//! 130 interrupted.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;

mod commands;
mod context;

use commands::{backfill, dedupe, discover, enrich, export, fix_records, scrape, verify};
use context::ConfigProblem;

/// aucyber - authoritative corpus of Australian cyber-security incidents
#[derive(Parser)]
#[command(
    name = "aucyber",
    version,
    about = "Discover, enrich, and deduplicate Australian cyber incidents",
    long_about = "Three-layer pipeline: multi-source discovery, LLM-backed \
enrichment with fact-checking, and entity-anchored deduplication.\n\
Every surfaced record traces back to at least one raw source."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect raw events from the configured sources
    Discover(discover::DiscoverArgs),

    /// Fetch full article content for pending raw events
    Scrape(scrape::ScrapeArgs),

    /// Run the enrichment pipeline over pending raw events
    Enrich(enrich::EnrichArgs),

    /// Rebuild the canonical deduplicated tier
    Dedupe,

    /// Month-by-month backfill (discover + scrape + enrich per month)
    Backfill(backfill::BackfillArgs),

    /// Re-validate enriched events against live web sources
    Verify(verify::VerifyArgs),

    /// Null out-of-policy records-affected values
    #[command(name = "fix-records")]
    FixRecords(fix_records::FixRecordsArgs),

    /// Export the deduplicated corpus
    Export(export::ExportArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let work = run(cli.command);
    let interrupted = tokio::signal::ctrl_c();

    tokio::select! {
        result = work => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                if error.downcast_ref::<ConfigProblem>().is_some() {
                    eprintln!("configuration error: {error}");
                    ExitCode::from(2)
                } else {
                    eprintln!("error: {error:#}");
                    ExitCode::from(1)
                }
            }
        },
        _ = interrupted => {
            eprintln!("interrupted");
            ExitCode::from(130)
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Discover(args) => discover::run(args).await,
        Commands::Scrape(args) => scrape::run(args).await,
        Commands::Enrich(args) => enrich::run(args).await,
        Commands::Dedupe => dedupe::run().await,
        Commands::Backfill(args) => backfill::run(args).await,
        Commands::Verify(args) => verify::run(args).await,
        Commands::FixRecords(args) => fix_records::run(args).await,
        Commands::Export(args) => export::run(args).await,
    }
}

fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn,aucyber=info",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();
}
