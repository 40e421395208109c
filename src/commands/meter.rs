use clap::{Args, Subcommand};

use super::{confirm, truncate, OutputFormat};
use meterlog::db::{MeterRepository, ReadingRepository};
use meterlog::models::Meter;
use meterlog::validation::{validate_meter_update, validate_new_meter, MeterInput};

#[derive(Args)]
pub struct MeterCommand {
    #[command(subcommand)]
    pub command: MeterSubcommand,
}

#[derive(Subcommand)]
pub enum MeterSubcommand {
    /// Register a new meter
    Add {
        /// Name of the meter
        name: String,

        /// Where the meter is installed
        #[arg(long)]
        location: Option<String>,

        /// Meter type (electric, water, gas, heat, other)
        #[arg(long = "type", value_name = "TYPE")]
        meter_type: Option<String>,

        /// Unit of measurement (default: kWh)
        #[arg(long)]
        unit: Option<String>,
    },

    /// List all meters
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a meter's details and statistics
    Show {
        /// Meter ID or name
        identifier: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update an existing meter
    Update {
        /// Meter ID or name
        identifier: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New location (empty string clears it)
        #[arg(long)]
        location: Option<String>,

        /// New meter type
        #[arg(long = "type", value_name = "TYPE")]
        meter_type: Option<String>,

        /// New unit
        #[arg(long)]
        unit: Option<String>,
    },

    /// Delete a meter and all its readings
    Delete {
        /// Meter ID or name
        identifier: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

/// Looks a meter up by numeric ID first, then by name.
pub(crate) async fn find_meter(
    repo: &MeterRepository,
    identifier: &str,
) -> Result<Meter, Box<dyn std::error::Error>> {
    let meter = match identifier.parse::<i64>() {
        Ok(id) => repo.get_by_id(id).await?,
        Err(_) => repo.get_by_name(identifier).await?,
    };
    meter.ok_or_else(|| format!("Meter not found: {}", identifier).into())
}

impl MeterCommand {
    pub async fn run(
        &self,
        meters: &MeterRepository,
        readings: &ReadingRepository,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            MeterSubcommand::Add {
                name,
                location,
                meter_type,
                unit,
            } => {
                let input = MeterInput {
                    name: Some(name.clone()),
                    location: location.clone(),
                    meter_type: meter_type.clone(),
                    unit: unit.clone(),
                };
                let new_meter = validate_new_meter(&input)?;

                if meters.get_by_name(&new_meter.name).await?.is_some() {
                    return Err(format!("A meter named '{}' already exists", new_meter.name).into());
                }

                let created = meters.create(&new_meter).await?;
                println!("Created meter:");
                println!("{}", created);
                Ok(())
            }

            MeterSubcommand::List { format } => {
                let list = meters.list().await?;

                if list.is_empty() {
                    println!("No meters found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&list)?);
                    }
                    OutputFormat::Text => {
                        println!(
                            "{:<5}  {:<25}  {:<20}  {:<8}  LATEST",
                            "ID", "NAME", "LOCATION", "TYPE"
                        );
                        println!("{}", "-".repeat(80));
                        for m in &list {
                            let latest = match &m.latest_reading {
                                Some(r) => format!(
                                    "{} {} ({})",
                                    r.value,
                                    m.meter.unit,
                                    r.reading_date.format("%Y-%m-%d")
                                ),
                                None => "-".to_string(),
                            };
                            println!(
                                "{:<5}  {:<25}  {:<20}  {:<8}  {}",
                                m.meter.id,
                                truncate(&m.meter.name, 25),
                                truncate(m.meter.location.as_deref().unwrap_or(""), 20),
                                m.meter.meter_type.to_string(),
                                latest
                            );
                        }
                        println!("\nTotal: {} meter(s)", list.len());
                    }
                }
                Ok(())
            }

            MeterSubcommand::Show { identifier, format } => {
                let meter = find_meter(meters, identifier).await?;
                let stats = readings.statistics(Some(meter.id)).await?;

                match format {
                    OutputFormat::Json => {
                        let value = serde_json::json!({ "meter": meter, "statistics": stats });
                        println!("{}", serde_json::to_string_pretty(&value)?);
                    }
                    OutputFormat::Text => {
                        println!("{}", meter);
                        println!();
                        println!("Readings: {}", stats.total_readings);
                        if let Some(latest) = stats.latest_reading_date {
                            println!("Latest:   {}", latest.format("%Y-%m-%d %H:%M"));
                        }
                        if let (Some(min), Some(max)) = (stats.min_value, stats.max_value) {
                            println!("Range:    {} - {} {}", min, max, meter.unit);
                        }
                    }
                }
                Ok(())
            }

            MeterSubcommand::Update {
                identifier,
                name,
                location,
                meter_type,
                unit,
            } => {
                let input = MeterInput {
                    name: name.clone(),
                    location: location.clone(),
                    meter_type: meter_type.clone(),
                    unit: unit.clone(),
                };
                let update = validate_meter_update(&input)?;
                let meter = find_meter(meters, identifier).await?;

                if let Some(new_name) = &update.name {
                    if let Some(other) = meters.get_by_name(new_name).await? {
                        if other.id != meter.id {
                            return Err(format!("A meter named '{}' already exists", new_name).into());
                        }
                    }
                }

                let updated = meters
                    .update(meter.id, &update)
                    .await?
                    .ok_or_else(|| format!("Meter not found: {}", identifier))?;
                println!("Updated meter:");
                println!("{}", updated);
                Ok(())
            }

            MeterSubcommand::Delete { identifier, force } => {
                let meter = find_meter(meters, identifier).await?;

                // Confirm deletion unless --force is used
                if !force {
                    let prompt = format!("Delete meter '{}' and all its readings?", meter.name);
                    if !confirm(&prompt)? {
                        println!("Deletion cancelled.");
                        return Ok(());
                    }
                }

                meters.delete(meter.id).await?;
                println!("Deleted meter: {}", meter.name);
                Ok(())
            }
        }
    }
}
