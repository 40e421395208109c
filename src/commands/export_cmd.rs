use chrono::Local;
use clap::Args;
use std::path::PathBuf;

use meterlog::db::{MeterRepository, ReadingRepository};
use meterlog::export::{build_workbook, export_filename, ExportData};

#[derive(Args)]
pub struct ExportCommand {
    /// Output file (default: garasje-avlesning-<timestamp>.xlsx in the current directory)
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl ExportCommand {
    pub async fn run(
        &self,
        meters: &MeterRepository,
        readings: &ReadingRepository,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = ExportData::collect(meters, readings).await?;
        let (meter_count, reading_count) = (data.meters.len(), data.readings.len());
        let bytes = build_workbook(&data)?;

        let path = self
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(export_filename(Local::now())));
        std::fs::write(&path, bytes)?;

        println!(
            "Exported {} meter(s) and {} reading(s) to {}",
            meter_count,
            reading_count,
            path.display()
        );
        Ok(())
    }
}
