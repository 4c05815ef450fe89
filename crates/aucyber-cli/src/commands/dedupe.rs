//! `aucyber dedupe`

use anyhow::Result;

use crate::context::AppContext;

pub async fn run() -> Result<()> {
    let context = AppContext::connect().await?;
    let orchestrator = context.orchestrator_lenient(context.workers());
    let (input, canonical) = orchestrator.dedupe().await?;
    println!("deduplicated {input} enriched events into {canonical} canonical events");
    Ok(())
}
