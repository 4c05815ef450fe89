//! `aucyber scrape`

use anyhow::Result;
use clap::Args;

use crate::context::AppContext;

#[derive(Args)]
pub struct ScrapeArgs {
    /// Maximum raw events to scrape
    #[arg(long, default_value_t = 200)]
    pub limit: i64,
}

pub async fn run(args: ScrapeArgs) -> Result<()> {
    let context = AppContext::connect().await?;
    let orchestrator = context.orchestrator_lenient(context.workers());
    let stats = orchestrator.scrape(args.limit).await?;
    println!("{stats}");
    Ok(())
}
