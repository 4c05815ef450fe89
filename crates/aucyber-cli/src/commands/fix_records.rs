//! `aucyber fix-records`

use anyhow::Result;
use clap::Args;

use aucyber_runtime::fix_records;

use crate::context::AppContext;

#[derive(Args)]
pub struct FixRecordsArgs {
    /// Report what would change without mutating anything
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(args: FixRecordsArgs) -> Result<()> {
    let context = AppContext::connect().await?;
    let report = fix_records(&context.store, args.dry_run).await?;
    println!(
        "examined={} out_of_policy={} cleared={}{}",
        report.examined,
        report.out_of_policy,
        report.cleared,
        if report.dry_run { " (dry run)" } else { "" }
    );
    Ok(())
}
