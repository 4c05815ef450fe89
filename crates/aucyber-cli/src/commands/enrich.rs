//! `aucyber enrich`

use anyhow::Result;
use clap::Args;

use crate::context::AppContext;

#[derive(Args)]
pub struct EnrichArgs {
    /// Maximum raw events to enrich this run
    #[arg(long, default_value_t = 50)]
    pub limit: i64,
}

pub async fn run(args: EnrichArgs) -> Result<()> {
    let context = AppContext::connect().await?;
    let orchestrator = context.orchestrator(context.workers())?;
    let stats = orchestrator.enrich(args.limit).await?;
    println!("{stats}");
    Ok(())
}
