use chrono::Utc;
use clap::{Args, Subcommand};
use serde_json::json;

use super::meter::find_meter;
use super::{confirm, truncate, OutputFormat};
use meterlog::db::{MeterRepository, ReadingRepository};
use meterlog::models::{Pagination, ReadingFilters};
use meterlog::validation::{parse_reading_date, validate_new_reading, ReadingInput};

#[derive(Args)]
pub struct ReadingCommand {
    #[command(subcommand)]
    pub command: ReadingSubcommand,
}

#[derive(Subcommand)]
pub enum ReadingSubcommand {
    /// Record a meter reading
    Add {
        /// Meter ID or name
        meter: String,

        /// Meter value
        value: f64,

        /// When the meter was read (ISO 8601, default: now)
        #[arg(long)]
        date: Option<String>,

        /// How the value was captured (manual, photo, ocr)
        #[arg(long)]
        method: Option<String>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,

        /// Stored photo file name
        #[arg(long)]
        image: Option<String>,
    },

    /// List readings, newest first
    List {
        /// Only readings for this meter (ID or name)
        #[arg(long)]
        meter: Option<String>,

        /// Earliest reading date (ISO 8601)
        #[arg(long)]
        from: Option<String>,

        /// Latest reading date (ISO 8601)
        #[arg(long)]
        to: Option<String>,

        /// Only readings not yet synced to Google Sheets
        #[arg(long)]
        unsynced: bool,

        /// Page number
        #[arg(long, default_value_t = 1)]
        page: i64,

        /// Readings per page
        #[arg(long, default_value_t = 50)]
        limit: i64,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show reading statistics
    Stats {
        /// Only this meter (ID or name)
        #[arg(long)]
        meter: Option<String>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete a reading
    Delete {
        /// Reading ID
        id: i64,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

fn parse_date_arg(raw: &str) -> Result<chrono::DateTime<Utc>, String> {
    parse_reading_date(raw).ok_or_else(|| format!("Invalid date: {}", raw))
}

impl ReadingCommand {
    pub async fn run(
        &self,
        meters: &MeterRepository,
        readings: &ReadingRepository,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ReadingSubcommand::Add {
                meter,
                value,
                date,
                method,
                notes,
                image,
            } => {
                let meter = find_meter(meters, meter).await?;
                let input = ReadingInput {
                    meter_id: Some(json!(meter.id)),
                    value: Some(json!(value)),
                    reading_date: date.clone(),
                    image_path: image.clone(),
                    input_method: method.clone(),
                    synced_to_sheets: None,
                    notes: notes.clone(),
                };
                let new_reading = validate_new_reading(&input, Utc::now())?;

                let created = readings.create(&new_reading).await?;
                println!(
                    "Recorded {} {} for '{}' (reading #{})",
                    created.value, meter.unit, meter.name, created.id
                );
                Ok(())
            }

            ReadingSubcommand::List {
                meter,
                from,
                to,
                unsynced,
                page,
                limit,
                format,
            } => {
                let meter_id = match meter {
                    Some(identifier) => Some(find_meter(meters, identifier).await?.id),
                    None => None,
                };
                let filters = ReadingFilters {
                    meter_id,
                    start_date: from.as_deref().map(parse_date_arg).transpose()?,
                    end_date: to.as_deref().map(parse_date_arg).transpose()?,
                    synced_to_sheets: unsynced.then_some(false),
                    input_method: None,
                };

                let result = readings
                    .find_all(&filters, Pagination::new(*page, *limit))
                    .await?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&result)?);
                    }
                    OutputFormat::Text => {
                        if result.readings.is_empty() {
                            println!("No readings found");
                            return Ok(());
                        }
                        println!(
                            "{:<6}  {:<16}  {:<20}  {:>12}  {:<6}  {:<8}  SYNCED",
                            "ID", "DATE", "METER", "VALUE", "UNIT", "METHOD"
                        );
                        println!("{}", "-".repeat(90));
                        for r in &result.readings {
                            println!(
                                "{:<6}  {:<16}  {:<20}  {:>12}  {:<6}  {:<8}  {}",
                                r.reading.id,
                                r.reading.reading_date.format("%Y-%m-%d %H:%M").to_string(),
                                truncate(&r.meter_name, 20),
                                r.reading.value,
                                r.meter_unit,
                                r.reading.input_method.to_string(),
                                if r.reading.synced_to_sheets { "yes" } else { "no" }
                            );
                        }
                        println!(
                            "\nPage {} of {} ({} reading(s))",
                            result.page,
                            result.total_pages.max(1),
                            result.total
                        );
                    }
                }
                Ok(())
            }

            ReadingSubcommand::Stats { meter, format } => {
                let meter_id = match meter {
                    Some(identifier) => Some(find_meter(meters, identifier).await?.id),
                    None => None,
                };
                let stats = readings.statistics(meter_id).await?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&stats)?);
                    }
                    OutputFormat::Text => {
                        println!("Total readings: {}", stats.total_readings);
                        if let Some(latest) = stats.latest_reading_date {
                            println!("Latest reading: {}", latest.format("%Y-%m-%d %H:%M"));
                        }
                        if let Some(avg) = stats.average_value {
                            println!("Average value:  {:.3}", avg);
                        }
                        if let Some(min) = stats.min_value {
                            println!("Min value:      {}", min);
                        }
                        if let Some(max) = stats.max_value {
                            println!("Max value:      {}", max);
                        }
                    }
                }
                Ok(())
            }

            ReadingSubcommand::Delete { id, force } => {
                let reading = readings
                    .get_by_id(*id)
                    .await?
                    .ok_or_else(|| format!("Reading not found: {}", id))?;

                if !force && !confirm(&format!("Delete reading #{} ({})?", reading.id, reading.value))? {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                readings.delete(reading.id).await?;
                println!("Deleted reading #{}", reading.id);
                Ok(())
            }
        }
    }
}
