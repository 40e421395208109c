use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::input_method::InputMethod;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: i64,
    pub meter_id: i64,
    pub value: f64,
    pub reading_date: DateTime<Utc>,
    pub image_path: Option<String>,
    pub input_method: InputMethod,
    pub synced_to_sheets: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A reading joined with the meter it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingWithMeter {
    #[serde(flatten)]
    pub reading: Reading,
    pub meter_name: String,
    pub meter_location: Option<String>,
    pub meter_unit: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub meter_id: i64,
    pub value: f64,
    /// Defaults to the time of insertion.
    pub reading_date: Option<DateTime<Utc>>,
    pub image_path: Option<String>,
    pub input_method: InputMethod,
    pub notes: Option<String>,
}

impl NewReading {
    pub fn new(meter_id: i64, value: f64) -> Self {
        Self {
            meter_id,
            value,
            reading_date: None,
            image_path: None,
            input_method: InputMethod::default(),
            notes: None,
        }
    }

    pub fn with_reading_date(mut self, reading_date: DateTime<Utc>) -> Self {
        self.reading_date = Some(reading_date);
        self
    }

    pub fn with_image_path(mut self, image_path: impl Into<String>) -> Self {
        self.image_path = Some(image_path.into());
        self
    }

    pub fn with_input_method(mut self, input_method: InputMethod) -> Self {
        self.input_method = input_method;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Partial update of a reading.
///
/// The synced flag can only be raised: `mark_synced = false` leaves it as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingUpdate {
    pub value: Option<f64>,
    pub reading_date: Option<DateTime<Utc>>,
    pub image_path: Option<String>,
    pub input_method: Option<InputMethod>,
    pub mark_synced: bool,
    pub notes: Option<String>,
}

impl ReadingUpdate {
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
            && self.reading_date.is_none()
            && self.image_path.is_none()
            && self.input_method.is_none()
            && !self.mark_synced
            && self.notes.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingFilters {
    pub meter_id: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub synced_to_sheets: Option<bool>,
    pub input_method: Option<InputMethod>,
}

/// Largest page size a caller may request.
pub const MAX_PAGE_LIMIT: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// Number of pages needed for `total` rows.
    pub fn total_pages(&self, total: i64) -> i64 {
        total / self.limit + i64::from(total % self.limit != 0)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaginatedReadings {
    pub readings: Vec<ReadingWithMeter>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadingStatistics {
    pub total_readings: i64,
    pub latest_reading_date: Option<DateTime<Utc>>,
    pub average_value: Option<f64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

impl fmt::Display for ReadingWithMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {} {} {} ({})",
            self.reading.id,
            self.reading.reading_date.format("%Y-%m-%d %H:%M"),
            self.meter_name,
            self.reading.value,
            self.meter_unit,
            self.reading.input_method
        )?;
        if !self.reading.synced_to_sheets {
            write!(f, " [unsynced]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_reading_defaults() {
        let reading = NewReading::new(1, 1234.5);
        assert_eq!(reading.meter_id, 1);
        assert_eq!(reading.input_method, InputMethod::Manual);
        assert!(reading.reading_date.is_none());
    }

    #[test]
    fn test_pagination_clamps_and_offsets() {
        let p = Pagination::new(0, 0);
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, 1);

        let p = Pagination::new(3, 20);
        assert_eq!(p.offset(), 40);
    }

    #[test]
    fn test_reading_update_is_empty() {
        assert!(ReadingUpdate::default().is_empty());
        let update = ReadingUpdate {
            mark_synced: true,
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_reading_with_meter_display() {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let reading = ReadingWithMeter {
            reading: Reading {
                id: 3,
                meter_id: 1,
                value: 1500.25,
                reading_date: date,
                image_path: None,
                input_method: InputMethod::Manual,
                synced_to_sheets: false,
                notes: None,
                created_at: date,
            },
            meter_name: "Lader".into(),
            meter_location: None,
            meter_unit: "kWh".into(),
        };

        let output = reading.to_string();
        assert!(output.contains("2024-01-01 12:00"));
        assert!(output.contains("Lader"));
        assert!(output.contains("1500.25 kWh"));
        assert!(output.contains("[unsynced]"));
    }

    #[test]
    fn test_pagination_extremes_do_not_overflow() {
        let last = Pagination::new(i64::MAX, 50);
        assert_eq!(last.offset(), i64::MAX);

        let huge = Pagination::new(1, i64::MAX);
        assert_eq!(huge.limit, MAX_PAGE_LIMIT);
        assert_eq!(huge.total_pages(3), 1);

        let page = Pagination::new(-5, 0);
        assert_eq!(page, Pagination::new(1, 1));
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let pagination = Pagination::new(1, 3);
        assert_eq!(pagination.total_pages(0), 0);
        assert_eq!(pagination.total_pages(3), 1);
        assert_eq!(pagination.total_pages(7), 3);
        assert_eq!(Pagination::new(1, 1).total_pages(i64::MAX), i64::MAX);
    }

    #[test]
    fn test_paginated_readings_serializes_total_pages() {
        let page = PaginatedReadings {
            readings: Vec::new(),
            total: 0,
            page: 1,
            limit: 50,
            total_pages: 0,
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["totalPages"], 0);
    }
}
