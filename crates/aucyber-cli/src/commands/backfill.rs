//! `aucyber backfill`

use anyhow::Result;
use clap::Args;

use crate::context::{AppContext, ConfigProblem};

#[derive(Args)]
pub struct BackfillArgs {
    /// First month to process (YYYY-MM)
    #[arg(long)]
    pub start_month: String,

    /// Last month to process (YYYY-MM)
    #[arg(long)]
    pub end_month: String,

    /// Only the high-signal sources (events store and regulator)
    #[arg(long)]
    pub priority_only: bool,

    /// Re-run months the ledger already marks complete
    #[arg(long)]
    pub force: bool,
}

fn parse_month(value: &str) -> Result<(i32, u32)> {
    let (year, month) = value
        .split_once('-')
        .ok_or_else(|| anyhow::Error::new(ConfigProblem(format!("bad month '{value}', expected YYYY-MM"))))?;
    let year: i32 = year
        .parse()
        .map_err(|_| anyhow::Error::new(ConfigProblem(format!("bad year in '{value}'"))))?;
    let month: u32 = month
        .parse()
        .map_err(|_| anyhow::Error::new(ConfigProblem(format!("bad month in '{value}'"))))?;
    if !(1..=12).contains(&month) {
        return Err(anyhow::Error::new(ConfigProblem(format!(
            "month out of range in '{value}'"
        ))));
    }
    Ok((year, month))
}

pub async fn run(args: BackfillArgs) -> Result<()> {
    let start = parse_month(&args.start_month)?;
    let end = parse_month(&args.end_month)?;
    if start > end {
        return Err(anyhow::Error::new(ConfigProblem(
            "start month is after end month".to_string(),
        )));
    }

    let context = AppContext::connect().await?;
    let orchestrator = context.orchestrator(context.workers())?;
    let totals = orchestrator
        .backfill(start, end, args.force, args.priority_only)
        .await?;
    println!("{totals}");
    Ok(())
}
