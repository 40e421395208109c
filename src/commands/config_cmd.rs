use clap::{Args, Subcommand};
use std::fmt::Display;

use super::OutputFormat;
use meterlog::config::{Config, ConfigValue};

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

fn print_value<T: Display>(key: &str, value: &ConfigValue<T>) {
    println!("{}: {}", key, value.value);
    println!("  source: {}", value.source);
}

fn print_optional<T: Display>(key: &str, value: &ConfigValue<Option<T>>) {
    match &value.value {
        Some(v) => println!("{}: {}", key, v),
        None => println!("{}: (not set)", key),
    }
    println!("  source: {}", value.source);
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!("upload_dir: {}", config.upload_dir.value.display());
                        println!("  source: {}", config.upload_dir.source);
                        print_value("port", &config.port);
                        print_value("cors_origin", &config.cors_origin);
                        match &config.static_dir.value {
                            Some(dir) => println!("static_dir: {}", dir.display()),
                            None => println!("static_dir: (not set)"),
                        }
                        println!("  source: {}", config.static_dir.source);
                        println!();

                        println!("sync:");
                        print_value("interval_minutes", &config.sync.interval_minutes);
                        match &config.sync.service_account_path.value {
                            Some(path) => println!("service_account_path: {}", path.display()),
                            None => println!("service_account_path: (not set)"),
                        }
                        println!("  source: {}", config.sync.service_account_path.source);
                        print_optional("spreadsheet_id", &config.sync.spreadsheet_id);
                        print_value("sheet_name", &config.sync.sheet_name);
                    }
                }
                Ok(())
            }
        }
    }
}
