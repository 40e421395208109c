//! Excel workbook export of all meters and readings.

use chrono::{DateTime, Datelike, Local, Utc};
use rust_xlsxwriter::{Color, Format, Workbook, Worksheet, XlsxError};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::db::{MeterRepository, ReadingRepository};
use crate::models::{
    MeterWithLatestReading, Pagination, ReadingFilters, ReadingWithMeter, MAX_PAGE_LIMIT,
};

pub const MAX_EXPORT_READINGS: i64 = MAX_PAGE_LIMIT;
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const HEADER_FILL: u32 = 0xE5E5E5;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to build workbook: {0}")]
    Xlsx(#[from] XlsxError),
}

/// Everything that goes into one export.
#[derive(Debug, Clone)]
pub struct ExportData {
    pub meters: Vec<MeterWithLatestReading>,
    pub readings: Vec<ReadingWithMeter>,
    pub generated_at: DateTime<Utc>,
}

impl ExportData {
    pub async fn collect(
        meters: &MeterRepository,
        readings: &ReadingRepository,
    ) -> Result<Self, ExportError> {
        let meters = meters.list().await?;
        let page = readings
            .find_all(
                &ReadingFilters::default(),
                Pagination::new(1, MAX_EXPORT_READINGS),
            )
            .await?;
        Ok(Self {
            meters,
            readings: page.readings,
            generated_at: Utc::now(),
        })
    }
}

/// Per meter and calendar month (local time) aggregate of reading values.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySummary {
    pub meter: String,
    pub month: String,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub unit: String,
}

/// Sorted by meter name, then month.
pub fn monthly_summary(readings: &[ReadingWithMeter]) -> Vec<MonthlySummary> {
    let mut groups: BTreeMap<(String, String), (String, Vec<f64>)> = BTreeMap::new();
    for r in readings {
        let local = r.reading.reading_date.with_timezone(&Local);
        let month = format!("{}-{:02}", local.year(), local.month());
        groups
            .entry((r.meter_name.clone(), month))
            .or_insert_with(|| (r.meter_unit.clone(), Vec::new()))
            .1
            .push(r.reading.value);
    }

    groups
        .into_iter()
        .map(|((meter, month), (unit, values))| {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            MonthlySummary {
                meter,
                month,
                count: values.len(),
                min,
                max,
                average: (mean * 100.0).round() / 100.0,
                unit,
            }
        })
        .collect()
}

pub fn export_filename(at: DateTime<Local>) -> String {
    format!("garasje-avlesning-{}.xlsx", at.format("%Y-%m-%d_%H-%M"))
}

fn local_date_time(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%d.%m.%Y %H:%M").to_string()
}

enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    fn display_len(&self) -> usize {
        match self {
            Cell::Text(s) => s.chars().count(),
            Cell::Number(n) => n.to_string().len(),
        }
    }
}

/// Writes rows to a worksheet while tracking column widths for auto-fit.
struct TableWriter {
    sheet: Worksheet,
    widths: Vec<usize>,
    row: u32,
}

impl TableWriter {
    fn new(name: &str, header: &[&str]) -> Result<Self, XlsxError> {
        let mut sheet = Worksheet::new();
        sheet.set_name(name)?;
        let mut writer = Self {
            sheet,
            widths: Vec::new(),
            row: 0,
        };

        let format = Format::new()
            .set_bold()
            .set_background_color(Color::RGB(HEADER_FILL));
        let cells: Vec<Cell> = header.iter().map(|h| Cell::text(*h)).collect();
        writer.write_row(&cells, Some(&format))?;
        Ok(writer)
    }

    fn write_row(&mut self, cells: &[Cell], format: Option<&Format>) -> Result<(), XlsxError> {
        for (col, cell) in cells.iter().enumerate() {
            let col_num = col as u16;
            match (cell, format) {
                (Cell::Text(s), Some(f)) => {
                    self.sheet.write_string_with_format(self.row, col_num, s, f)?;
                }
                (Cell::Text(s), None) => {
                    self.sheet.write_string(self.row, col_num, s)?;
                }
                (Cell::Number(n), Some(f)) => {
                    self.sheet.write_number_with_format(self.row, col_num, *n, f)?;
                }
                (Cell::Number(n), None) => {
                    self.sheet.write_number(self.row, col_num, *n)?;
                }
            }
            if self.widths.len() <= col {
                self.widths.resize(col + 1, 0);
            }
            self.widths[col] = self.widths[col].max(cell.display_len());
        }
        self.row += 1;
        Ok(())
    }

    fn finish(mut self, min_width: usize, max_width: usize) -> Result<Worksheet, XlsxError> {
        for (col, width) in self.widths.iter().enumerate() {
            let width = (width + 2).clamp(min_width, max_width);
            self.sheet.set_column_width(col as u16, width as f64)?;
        }
        Ok(self.sheet)
    }
}

fn overview_sheet(data: &ExportData) -> Result<Worksheet, XlsxError> {
    let mut sheet = Worksheet::new();
    sheet.set_name("Oversikt")?;

    let title = Format::new().set_bold().set_font_size(16);
    let bold = Format::new().set_bold();

    sheet.write_string_with_format(0, 0, "Garasje Avlesning - Dataeksport", &title)?;
    sheet.write_string(1, 0, "Generert:")?;
    sheet.write_string(1, 1, local_date_time(&data.generated_at))?;
    sheet.write_string_with_format(3, 0, "Statistikk:", &bold)?;
    sheet.write_string(4, 0, "Antall målere:")?;
    sheet.write_number(4, 1, data.meters.len() as f64)?;
    sheet.write_string(5, 0, "Antall avlesninger:")?;
    sheet.write_number(5, 1, data.readings.len() as f64)?;
    sheet.write_string(6, 0, "Versjon:")?;
    sheet.write_string(6, 1, env!("CARGO_PKG_VERSION"))?;
    sheet.set_column_width(0, 22)?;
    sheet.set_column_width(1, 20)?;

    Ok(sheet)
}

fn meters_sheet(meters: &[MeterWithLatestReading]) -> Result<Worksheet, XlsxError> {
    let mut table = TableWriter::new(
        "Målere",
        &[
            "ID",
            "Navn",
            "Lokasjon",
            "Type",
            "Enhet",
            "Opprettet",
            "Sist oppdatert",
            "Siste avlesning",
        ],
    )?;

    for m in meters {
        let latest = match &m.latest_reading {
            Some(latest) => format!(
                "{} {} ({})",
                latest.value,
                m.meter.unit,
                latest.reading_date.with_timezone(&Local).format("%d.%m.%Y")
            ),
            None => "Ingen avlesninger".to_string(),
        };
        table.write_row(
            &[
                Cell::Number(m.meter.id as f64),
                Cell::text(m.meter.name.as_str()),
                Cell::text(m.meter.location.as_deref().unwrap_or("")),
                Cell::text(m.meter.meter_type.label()),
                Cell::text(m.meter.unit.as_str()),
                Cell::text(local_date_time(&m.meter.created_at)),
                Cell::text(local_date_time(&m.meter.updated_at)),
                Cell::Text(latest),
            ],
            None,
        )?;
    }

    table.finish(10, 50)
}

fn readings_sheet(readings: &[ReadingWithMeter]) -> Result<Worksheet, XlsxError> {
    let mut table = TableWriter::new(
        "Avlesninger",
        &[
            "ID",
            "Måler",
            "Lokasjon",
            "Verdi",
            "Enhet",
            "Avlesningsdato",
            "Metode",
            "Synkronisert til Sheets",
            "Notater",
            "Opprettet",
        ],
    )?;

    for r in readings {
        table.write_row(
            &[
                Cell::Number(r.reading.id as f64),
                Cell::text(r.meter_name.as_str()),
                Cell::text(r.meter_location.as_deref().unwrap_or("")),
                Cell::Number(r.reading.value),
                Cell::text(r.meter_unit.as_str()),
                Cell::text(local_date_time(&r.reading.reading_date)),
                Cell::text(r.reading.input_method.label()),
                Cell::text(if r.reading.synced_to_sheets { "Ja" } else { "Nei" }),
                Cell::text(r.reading.notes.as_deref().unwrap_or("")),
                Cell::text(local_date_time(&r.reading.created_at)),
            ],
            None,
        )?;
    }

    table.finish(10, 50)
}

fn summary_sheet(readings: &[ReadingWithMeter]) -> Result<Worksheet, XlsxError> {
    let mut table = TableWriter::new(
        "Månedssammendrag",
        &[
            "Måler",
            "Måned",
            "Antall avlesninger",
            "Min verdi",
            "Max verdi",
            "Gjennomsnitt",
            "Enhet",
        ],
    )?;

    for s in monthly_summary(readings) {
        table.write_row(
            &[
                Cell::Text(s.meter),
                Cell::Text(s.month),
                Cell::Number(s.count as f64),
                Cell::Number(s.min),
                Cell::Number(s.max),
                Cell::Number(s.average),
                Cell::Text(s.unit),
            ],
            None,
        )?;
    }

    table.finish(10, 30)
}

/// Renders the four-sheet workbook into an in-memory xlsx file.
pub fn build_workbook(data: &ExportData) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    workbook.push_worksheet(overview_sheet(data)?);
    workbook.push_worksheet(meters_sheet(&data.meters)?);
    workbook.push_worksheet(readings_sheet(&data.readings)?);
    workbook.push_worksheet(summary_sheet(&data.readings)?);

    let bytes = workbook.save_to_buffer()?;
    tracing::info!(
        meters = data.meters.len(),
        readings = data.readings.len(),
        size = bytes.len(),
        "Built Excel export"
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InputMethod, Meter, MeterType, Reading};
    use chrono::TimeZone;

    fn reading(id: i64, meter: &str, value: f64, month: u32, day: u32) -> ReadingWithMeter {
        // Mid-day so the local month matches the UTC month
        let at = Utc.with_ymd_and_hms(2024, month, day, 12, 0, 0).unwrap();
        ReadingWithMeter {
            reading: Reading {
                id,
                meter_id: 1,
                value,
                reading_date: at,
                image_path: None,
                input_method: InputMethod::Manual,
                synced_to_sheets: id % 2 == 0,
                notes: None,
                created_at: at,
            },
            meter_name: meter.to_string(),
            meter_location: None,
            meter_unit: "kWh".to_string(),
        }
    }

    #[test]
    fn test_monthly_summary_groups_and_sorts() {
        let readings = vec![
            reading(1, "Vann", 5.0, 2, 10),
            reading(2, "Lader", 10.0, 1, 5),
            reading(3, "Lader", 20.0, 1, 15),
            reading(4, "Lader", 25.0, 1, 25),
            reading(5, "Lader", 30.0, 2, 1),
        ];

        let summary = monthly_summary(&readings);
        let keys: Vec<_> = summary
            .iter()
            .map(|s| (s.meter.as_str(), s.month.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![("Lader", "2024-01"), ("Lader", "2024-02"), ("Vann", "2024-02")]
        );

        let january = &summary[0];
        assert_eq!(january.count, 3);
        assert_eq!(january.min, 10.0);
        assert_eq!(january.max, 25.0);
        assert_eq!(january.average, 18.33);
        assert_eq!(january.unit, "kWh");
    }

    #[test]
    fn test_export_filename() {
        let at = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 0).unwrap();
        assert_eq!(export_filename(at), "garasje-avlesning-2024-03-07_09-05.xlsx");
    }

    #[test]
    fn test_build_workbook_produces_xlsx() {
        let now = Utc::now();
        let data = ExportData {
            meters: vec![MeterWithLatestReading {
                meter: Meter {
                    id: 1,
                    name: "Lader".to_string(),
                    location: Some("Garasje".to_string()),
                    meter_type: MeterType::Electric,
                    unit: "kWh".to_string(),
                    created_at: now,
                    updated_at: now,
                },
                latest_reading: None,
            }],
            readings: vec![reading(1, "Lader", 10.0, 1, 5), reading(2, "Lader", 12.5, 1, 6)],
            generated_at: now,
        };

        let bytes = build_workbook(&data).unwrap();
        // xlsx files are zip archives
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn test_build_workbook_without_data() {
        let data = ExportData {
            meters: Vec::new(),
            readings: Vec::new(),
            generated_at: Utc::now(),
        };
        assert!(build_workbook(&data).is_ok());
    }
}
