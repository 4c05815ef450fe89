//! `aucyber verify` - search-grounded verification backfill

use anyhow::Result;
use clap::Args;
use std::sync::Arc;

use aucyber_llm::PerplexityProvider;
use aucyber_runtime::backfill_verifications;

use crate::context::{AppContext, ConfigProblem};

#[derive(Args)]
pub struct VerifyArgs {
    /// Maximum events to re-validate this run
    #[arg(long, default_value_t = 100)]
    pub limit: i64,
}

pub async fn run(args: VerifyArgs) -> Result<()> {
    let context = AppContext::connect().await?;
    let key = context.env.perplexity_api_key.as_deref().ok_or_else(|| {
        anyhow::Error::new(ConfigProblem(
            "PERPLEXITY_API_KEY is required for verification".to_string(),
        ))
    })?;
    let search = Arc::new(PerplexityProvider::new(key));

    let report = backfill_verifications(
        &context.store,
        search,
        context.rate_limiter.clone(),
        args.limit,
    )
    .await?;

    println!(
        "processed={} validated={} corrected_dates={} corrected_records={} errors={}",
        report.processed,
        report.validated,
        report.corrected_dates,
        report.corrected_records,
        report.errors
    );
    Ok(())
}
