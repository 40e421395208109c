//! Remote spreadsheet destination for synced readings.

mod auth;
mod google;

pub use auth::{ServiceAccountKey, TokenProvider};
pub use google::GoogleSheetsClient;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::config::SyncConfig;
use crate::models::ReadingWithMeter;

pub const DEFAULT_SHEET_NAME: &str = "Avlesninger";

/// Header row of the destination sheet, columns A through I.
pub const HEADER: [&str; 9] = [
    "Dato",
    "Måler",
    "Lokasjon",
    "Verdi",
    "Enhet",
    "Metode",
    "Notater",
    "Synkronisert",
    "ID",
];

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("failed to read service account key {path}: {source}")]
    KeyFile {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid service account key: {0}")]
    InvalidKey(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sheets api returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Metadata about the destination spreadsheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetInfo {
    pub title: String,
    pub url: String,
    pub last_modified: Option<String>,
}

#[async_trait]
pub trait SheetClient: Send + Sync {
    /// Creates the sheet and its header row if missing. Idempotent.
    async fn ensure_destination_ready(&self) -> Result<(), SheetError>;

    /// Appends one row per reading after the last used row, in a single write.
    async fn append_rows(&self, readings: &[ReadingWithMeter]) -> Result<(), SheetError>;

    /// Read-only probe of the destination.
    async fn test_connection(&self) -> bool;

    async fn destination_info(&self) -> Result<SheetInfo, SheetError>;
}

/// Builds the Google Sheets client from configuration.
///
/// Returns `None` when sync is not configured or the client cannot be created;
/// sync is then disabled rather than failing startup.
pub fn client_from_config(config: &SyncConfig) -> Option<Arc<dyn SheetClient>> {
    let (Some(key_path), Some(spreadsheet_id)) = (
        config.service_account_path.value.as_ref(),
        config.spreadsheet_id.value.as_ref(),
    ) else {
        tracing::warn!("Google Sheets configuration not found, sync disabled");
        return None;
    };

    match GoogleSheetsClient::from_key_file(key_path, spreadsheet_id, &config.sheet_name.value) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize Google Sheets client, sync disabled");
            None
        }
    }
}

/// Formats a timestamp the way the sheet displays dates, in local time.
pub fn format_sheet_date(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%d.%m.%Y, %H:%M:%S")
        .to_string()
}

/// Builds the sheet row for one reading, in [`HEADER`] column order.
pub fn reading_row(reading: &ReadingWithMeter, synced_at: &DateTime<Utc>) -> Vec<Value> {
    vec![
        json!(format_sheet_date(&reading.reading.reading_date)),
        json!(reading.meter_name),
        json!(reading.meter_location.as_deref().unwrap_or("")),
        json!(reading.reading.value),
        json!(reading.meter_unit),
        json!(reading.reading.input_method.label()),
        json!(reading.reading.notes.as_deref().unwrap_or("")),
        json!(format_sheet_date(synced_at)),
        json!(reading.reading.id),
    ]
}

/// A1 range `Sheet!A{first}:I{last}`, quoted when the sheet name needs it.
pub fn row_range(sheet_name: &str, first_row: usize, last_row: usize) -> String {
    format!("{}!A{}:I{}", quote_sheet_name(sheet_name), first_row, last_row)
}

pub fn columns_range(sheet_name: &str) -> String {
    format!("{}!A:I", quote_sheet_name(sheet_name))
}

fn quote_sheet_name(name: &str) -> String {
    if name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InputMethod, Reading};
    use chrono::TimeZone;

    fn sample() -> ReadingWithMeter {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 8, 30, 0).unwrap();
        ReadingWithMeter {
            reading: Reading {
                id: 42,
                meter_id: 1,
                value: 1234.5,
                reading_date: at,
                image_path: None,
                input_method: InputMethod::Photo,
                synced_to_sheets: false,
                notes: None,
                created_at: at,
            },
            meter_name: "Lader".to_string(),
            meter_location: None,
            meter_unit: "kWh".to_string(),
        }
    }

    #[test]
    fn test_reading_row_column_order() {
        let reading = sample();
        let synced_at = Utc.with_ymd_and_hms(2024, 1, 3, 10, 0, 0).unwrap();
        let row = reading_row(&reading, &synced_at);

        assert_eq!(row.len(), HEADER.len());
        assert_eq!(row[0], json!(format_sheet_date(&reading.reading.reading_date)));
        assert_eq!(row[1], json!("Lader"));
        assert_eq!(row[2], json!(""));
        assert_eq!(row[3], json!(1234.5));
        assert_eq!(row[4], json!("kWh"));
        assert_eq!(row[5], json!("Bilde"));
        assert_eq!(row[6], json!(""));
        assert_eq!(row[7], json!(format_sheet_date(&synced_at)));
        assert_eq!(row[8], json!(42));
    }

    #[test]
    fn test_format_sheet_date_shape() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let formatted = format_sheet_date(&at);
        // Local offset varies, the layout does not
        assert_eq!(formatted.len(), "09.03.2024, 12:00:00".len());
        assert_eq!(&formatted[2..3], ".");
        assert_eq!(&formatted[5..6], ".");
        assert_eq!(&formatted[10..12], ", ");
    }

    #[test]
    fn test_client_from_config_requires_both_settings() {
        let mut config = SyncConfig::default();
        assert!(client_from_config(&config).is_none());

        config.spreadsheet_id.value = Some("sheet".to_string());
        config.service_account_path.value = Some("/nonexistent/key.json".into());
        // Unreadable key file disables sync instead of failing
        assert!(client_from_config(&config).is_none());
    }

    #[test]
    fn test_ranges() {
        assert_eq!(row_range("Avlesninger", 5, 7), "Avlesninger!A5:I7");
        assert_eq!(columns_range("Avlesninger"), "Avlesninger!A:I");
        assert_eq!(row_range("Mine data", 1, 1), "'Mine data'!A1:I1");
        assert_eq!(columns_range("Kari's"), "'Kari''s'!A:I");
    }
}
