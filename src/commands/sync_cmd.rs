//! Sync commands. They talk to a running meterlog server, which owns the sync lock.

use chrono::Local;
use clap::{Args, Subcommand};

use meterlog::client::ServerClient;
use meterlog::config::Config;

#[derive(Args)]
pub struct SyncCommand {
    /// Server URL (default: http://localhost:<configured port>)
    #[arg(long, global = true)]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: SyncSubcommand,
}

#[derive(Subcommand)]
pub enum SyncSubcommand {
    /// Ask the server to push unsynced readings to Google Sheets now
    Run,

    /// Show the server's sync state
    Status,
}

impl SyncCommand {
    fn server_url(&self, config: &Config) -> String {
        self.server
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", config.port.value))
    }

    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let client = ServerClient::new(self.server_url(config))?;

        match &self.command {
            SyncSubcommand::Run => {
                println!("Syncing via {}...", client.base_url());
                let report = client.trigger_sync().await?;
                if report.synced_count == 0 {
                    println!("No new readings to sync");
                } else {
                    println!("Synced {} reading(s) to Google Sheets", report.synced_count);
                }
                if report.total_unsynced > 0 {
                    println!(
                        "{} reading(s) still pending, run again to continue",
                        report.total_unsynced
                    );
                }
                Ok(())
            }

            SyncSubcommand::Status => {
                let status = client.sync_status().await?;

                println!("Sync Status");
                println!("===========\n");
                println!("Server:        {}", client.base_url());
                println!(
                    "Google Sheets: {}",
                    if status.google_sheets_configured {
                        "configured"
                    } else {
                        "not configured"
                    }
                );
                println!(
                    "Auto-sync:     {}",
                    if status.auto_sync_enabled {
                        "enabled"
                    } else {
                        "disabled"
                    }
                );
                if let Some(next) = status.next_sync_time {
                    println!(
                        "Next sync:     {}",
                        next.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
                    );
                }
                println!("Unsynced:      {}", status.unsynced_count);
                if let Some(info) = status.sheets_info {
                    println!("Title:         {}", info.title);
                    println!("URL:           {}", info.url);
                }
                Ok(())
            }
        }
    }
}
