use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{ConfigCommand, ExportCommand, MeterCommand, ReadingCommand, SyncCommand};
use meterlog::config::Config;
use meterlog::db::{init_db, MeterRepository, ReadingRepository};

#[derive(Parser)]
#[command(name = "meterlog")]
#[command(version)]
#[command(about = "Record utility meter readings and sync them to Google Sheets", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage meters
    Meter(MeterCommand),

    /// Record and inspect readings
    Reading(ReadingCommand),

    /// Sync readings to Google Sheets
    Sync(SyncCommand),

    /// Export all data to an Excel workbook
    Export(ExportCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meterlog=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    let Some(command) = cli.command else {
        println!("Use --help to see available commands");
        return Ok(());
    };

    match command {
        Commands::Config(cmd) => cmd.run(&config)?,
        Commands::Sync(cmd) => cmd.run(&config).await?,
        Commands::Meter(cmd) => {
            let (meters, readings) = open_store(&config).await?;
            cmd.run(&meters, &readings).await?
        }
        Commands::Reading(cmd) => {
            let (meters, readings) = open_store(&config).await?;
            cmd.run(&meters, &readings).await?
        }
        Commands::Export(cmd) => {
            let (meters, readings) = open_store(&config).await?;
            cmd.run(&meters, &readings).await?
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<(MeterRepository, ReadingRepository), sqlx::Error> {
    let pool = init_db(&config.database_path.value).await?;
    Ok((MeterRepository::new(pool.clone()), ReadingRepository::new(pool)))
}
