//! `aucyber discover`

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;

use aucyber_core::DateRange;

use crate::context::{AppContext, ConfigProblem};

#[derive(Args)]
pub struct DiscoverArgs {
    /// Comma-separated source names (default: all configured)
    #[arg(long, value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Window start (YYYY-MM-DD)
    #[arg(long)]
    pub start: NaiveDate,

    /// Window end (YYYY-MM-DD, default: today)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Stop after this many new raw events
    #[arg(long)]
    pub max_events: Option<usize>,
}

pub async fn run(args: DiscoverArgs) -> Result<()> {
    let range = DateRange::new(args.start, args.end)
        .map_err(|e| anyhow::Error::new(ConfigProblem(e.to_string())))?;

    let context = AppContext::connect().await?;
    let orchestrator = context.orchestrator_lenient(context.workers());

    let filter: Vec<&str> = args.sources.iter().map(|s| s.as_str()).collect();
    let filter = (!filter.is_empty()).then_some(filter.as_slice());
    let stats = orchestrator.discover(&range, filter, args.max_events).await?;
    println!("{stats}");
    Ok(())
}
