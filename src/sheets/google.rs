use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

use super::{
    columns_range, reading_row, row_range, ServiceAccountKey, SheetClient, SheetError, SheetInfo,
    TokenProvider, HEADER,
};
use crate::models::ReadingWithMeter;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SpreadsheetMeta {
    properties: SpreadsheetProperties,
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SpreadsheetProperties {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ValueRange {
    values: Vec<Vec<Value>>,
}

impl SpreadsheetMeta {
    fn sheet_id(&self, title: &str) -> Option<i64> {
        self.sheets
            .iter()
            .find(|s| s.properties.title == title)
            .map(|s| s.properties.sheet_id)
    }
}

/// [`SheetClient`] backed by the Google Sheets v4 REST API.
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    auth: TokenProvider,
    spreadsheet_id: String,
    sheet_name: String,
}

impl GoogleSheetsClient {
    pub fn new(
        key: ServiceAccountKey,
        spreadsheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
    ) -> Result<Self, SheetError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let auth = TokenProvider::new(key, http.clone())?;

        Ok(Self {
            http,
            auth,
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
        })
    }

    pub fn from_key_file(
        key_path: &Path,
        spreadsheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
    ) -> Result<Self, SheetError> {
        let client = Self::new(ServiceAccountKey::from_file(key_path)?, spreadsheet_id, sheet_name)?;
        tracing::info!(
            account = %client.auth.client_email(),
            sheet = %client.sheet_name,
            "Google Sheets client initialized"
        );
        Ok(client)
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    fn spreadsheet_url(&self) -> String {
        format!("{}/spreadsheets/{}", SHEETS_API, self.spreadsheet_id)
    }

    fn values_url(&self, range: &str) -> String {
        format!("{}/values/{}", self.spreadsheet_url(), urlencoding::encode(range))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, SheetError> {
        let token = self.auth.access_token().await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SheetError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    async fn metadata(&self) -> Result<SpreadsheetMeta, SheetError> {
        let request = self
            .http
            .get(self.spreadsheet_url())
            .query(&[("fields", "properties.title,sheets.properties(sheetId,title)")]);
        self.send(request).await
    }

    async fn batch_update(&self, requests: Value) -> Result<Value, SheetError> {
        let request = self
            .http
            .post(format!("{}:batchUpdate", self.spreadsheet_url()))
            .json(&json!({ "requests": requests }));
        self.send(request).await
    }

    async fn get_values(&self, range: &str) -> Result<ValueRange, SheetError> {
        self.send(self.http.get(self.values_url(range))).await
    }

    async fn put_values(&self, range: &str, values: Vec<Vec<Value>>) -> Result<(), SheetError> {
        let request = self
            .http
            .put(self.values_url(range))
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "range": range, "values": values }));
        let _: Value = self.send(request).await?;
        Ok(())
    }

    async fn add_sheet(&self) -> Result<i64, SheetError> {
        let response = self
            .batch_update(json!([
                { "addSheet": { "properties": { "title": self.sheet_name } } }
            ]))
            .await?;

        let sheet_id = response
            .pointer("/replies/0/addSheet/properties/sheetId")
            .and_then(Value::as_i64)
            .ok_or_else(|| SheetError::Api {
                status: 200,
                message: "addSheet reply did not include a sheet id".to_string(),
            })?;

        tracing::info!(sheet = %self.sheet_name, sheet_id, "Created new sheet");
        Ok(sheet_id)
    }

    async fn ensure_header(&self, sheet_id: i64) -> Result<(), SheetError> {
        let header_range = row_range(&self.sheet_name, 1, 1);
        let existing = self.get_values(&header_range).await?;
        if !existing.values.is_empty() {
            return Ok(());
        }

        let header: Vec<Value> = HEADER.iter().map(|h| json!(h)).collect();
        self.put_values(&header_range, vec![header]).await?;

        self.batch_update(json!([{
            "repeatCell": {
                "range": {
                    "sheetId": sheet_id,
                    "startRowIndex": 0,
                    "endRowIndex": 1,
                    "startColumnIndex": 0,
                    "endColumnIndex": HEADER.len(),
                },
                "cell": {
                    "userEnteredFormat": {
                        "backgroundColor": { "red": 0.9, "green": 0.9, "blue": 0.9 },
                        "textFormat": { "bold": true },
                    }
                },
                "fields": "userEnteredFormat(backgroundColor,textFormat)",
            }
        }]))
        .await?;

        tracing::info!(sheet = %self.sheet_name, "Added header row");
        Ok(())
    }
}

#[async_trait]
impl SheetClient for GoogleSheetsClient {
    async fn ensure_destination_ready(&self) -> Result<(), SheetError> {
        let meta = self.metadata().await?;
        let sheet_id = match meta.sheet_id(&self.sheet_name) {
            Some(id) => id,
            None => self.add_sheet().await?,
        };
        self.ensure_header(sheet_id).await
    }

    async fn append_rows(&self, readings: &[ReadingWithMeter]) -> Result<(), SheetError> {
        if readings.is_empty() {
            return Ok(());
        }

        self.ensure_destination_ready().await?;

        let synced_at = Utc::now();
        let rows: Vec<Vec<Value>> = readings
            .iter()
            .map(|reading| reading_row(reading, &synced_at))
            .collect();

        let existing = self.get_values(&columns_range(&self.sheet_name)).await?;
        let first_row = existing.values.len() + 1;
        let last_row = first_row + rows.len() - 1;

        self.put_values(&row_range(&self.sheet_name, first_row, last_row), rows)
            .await?;

        tracing::info!(
            count = readings.len(),
            first_row,
            sheet = %self.sheet_name,
            "Appended readings to Google Sheets"
        );
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        match self.metadata().await {
            Ok(_) => {
                tracing::info!("Google Sheets connection test successful");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Google Sheets connection test failed");
                false
            }
        }
    }

    async fn destination_info(&self) -> Result<SheetInfo, SheetError> {
        let meta = self.metadata().await?;
        Ok(SheetInfo {
            title: meta
                .properties
                .title
                .unwrap_or_else(|| "Unknown".to_string()),
            url: format!(
                "https://docs.google.com/spreadsheets/d/{}",
                self.spreadsheet_id
            ),
            last_modified: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_finds_sheet_by_title() {
        let meta: SpreadsheetMeta = serde_json::from_value(json!({
            "properties": { "title": "Garasje Avlesninger" },
            "sheets": [
                { "properties": { "sheetId": 0, "title": "Ark1" } },
                { "properties": { "sheetId": 917, "title": "Avlesninger" } }
            ]
        }))
        .unwrap();

        assert_eq!(meta.properties.title.as_deref(), Some("Garasje Avlesninger"));
        assert_eq!(meta.sheet_id("Avlesninger"), Some(917));
        assert_eq!(meta.sheet_id("Mangler"), None);
    }

    #[test]
    fn test_empty_value_range_parses() {
        let range: ValueRange = serde_json::from_value(json!({ "range": "A1:I1" })).unwrap();
        assert!(range.values.is_empty());
    }
}
