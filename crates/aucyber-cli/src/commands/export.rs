//! `aucyber export`

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::path::PathBuf;

use aucyber_persist::CanonicalExportRow;

use crate::context::AppContext;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Output format
    #[arg(long, value_enum, default_value = "csv")]
    pub format: ExportFormat,

    /// Output path
    #[arg(long)]
    pub output: PathBuf,
}

const HEADERS: &[&str] = &[
    "event_id",
    "title",
    "victim_organization",
    "industry",
    "event_type",
    "severity",
    "event_date",
    "records_affected",
    "attacker",
    "attack_method",
    "data_sources",
    "confidence",
];

fn row_fields(row: &CanonicalExportRow) -> Vec<String> {
    vec![
        row.deduplicated_event_id.to_string(),
        row.title.clone(),
        row.victim_organization_name.clone().unwrap_or_default(),
        row.victim_organization_industry.clone().unwrap_or_default(),
        row.event_type.clone(),
        row.severity.clone(),
        row.event_date.map(|d| d.to_string()).unwrap_or_default(),
        row.records_affected.map(|r| r.to_string()).unwrap_or_default(),
        row.attacking_entity_name.clone().unwrap_or_default(),
        row.attack_method.clone().unwrap_or_default(),
        row.total_data_sources.to_string(),
        format!("{:.3}", row.confidence_score),
    ]
}

fn write_csv(rows: &[CanonicalExportRow], output: &PathBuf) -> Result<()> {
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("creating {}", output.display()))?;
    writer.write_record(HEADERS)?;
    for row in rows {
        writer.write_record(row_fields(row))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_xlsx(rows: &[CanonicalExportRow], output: &PathBuf) -> Result<()> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Deduplicated Events")?;

    for (column, header) in HEADERS.iter().enumerate() {
        worksheet.write_string(0, column as u16, *header)?;
    }
    for (index, row) in rows.iter().enumerate() {
        let excel_row = (index + 1) as u32;
        for (column, field) in row_fields(row).into_iter().enumerate() {
            worksheet.write_string(excel_row, column as u16, field)?;
        }
    }

    workbook
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}

pub async fn run(args: ExportArgs) -> Result<()> {
    let context = AppContext::connect().await?;
    let rows = context.store.list_canonical().await?;

    match args.format {
        ExportFormat::Csv => write_csv(&rows, &args.output)?,
        ExportFormat::Xlsx => write_xlsx(&rows, &args.output)?,
    }

    println!("exported {} events to {}", rows.len(), args.output.display());
    Ok(())
}
