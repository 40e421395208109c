//! Request validation. Every rule is checked and all failures are reported together.

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::{InputMethod, MeterType, MeterUpdate, NewMeter, NewReading, ReadingUpdate};

const NAME_MAX: usize = 100;
const LOCATION_MAX: usize = 200;
const UNIT_MAX: usize = 20;
const IMAGE_PATH_MAX: usize = 500;
const NOTES_MAX: usize = 1000;
/// Oldest accepted reading year. Stored timestamps must stay four-digit RFC 3339.
const MIN_READING_YEAR: i32 = 1970;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("validation failed: {}", .0.join("; "))]
pub struct ValidationErrors(pub Vec<String>);

/// Meter fields as submitted by a client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeterInput {
    pub name: Option<String>,
    pub location: Option<String>,
    pub meter_type: Option<String>,
    pub unit: Option<String>,
}

/// Reading fields as submitted by a client. Numbers may arrive as JSON
/// numbers or numeric strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadingInput {
    pub meter_id: Option<Value>,
    pub value: Option<Value>,
    pub reading_date: Option<String>,
    pub image_path: Option<String>,
    pub input_method: Option<String>,
    pub synced_to_sheets: Option<Value>,
    pub notes: Option<String>,
}

#[derive(Default)]
struct Collector(Vec<String>);

impl Collector {
    fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    fn max_len(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.push(format!("{} cannot be longer than {} characters", field, max));
        }
    }

    fn finish<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(ValidationErrors(self.0))
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses a positive integer id from a JSON number or numeric string.
pub fn parse_positive_id(raw: &str) -> Result<i64, String> {
    let number: f64 = raw
        .trim()
        .parse()
        .map_err(|_| "meter_id must be a number".to_string())?;
    check_positive_id(number)
}

fn check_positive_id(number: f64) -> Result<i64, String> {
    if number.fract() != 0.0 || !number.is_finite() {
        return Err("meter_id must be an integer".to_string());
    }
    if number <= 0.0 {
        return Err("meter_id must be a positive number".to_string());
    }
    Ok(number as i64)
}

fn meter_id_from(value: &Value) -> Result<i64, String> {
    let number = as_number(value).ok_or_else(|| "meter_id must be a number".to_string())?;
    check_positive_id(number)
}

fn reading_value_from(value: &Value) -> Result<f64, String> {
    let number = as_number(value).ok_or_else(|| "value must be a number".to_string())?;
    if !number.is_finite() || number <= 0.0 {
        return Err("value must be a positive number".to_string());
    }
    let scaled = number * 1000.0;
    if (scaled - scaled.round()).abs() > 1e-12 * scaled.abs().max(1.0) {
        return Err("value can have at most 3 decimals".to_string());
    }
    Ok(number)
}

/// Parses an ISO-8601 timestamp: RFC 3339, a naive date-time (local time) or
/// a plain date (midnight UTC).
pub fn parse_reading_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn reading_date_from(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    let date = parse_reading_date(raw)
        .ok_or_else(|| "reading_date must be in ISO 8601 format".to_string())?;
    if date > now {
        return Err("reading_date cannot be in the future".to_string());
    }
    if date.year() < MIN_READING_YEAR {
        return Err(format!("reading_date cannot be before {}", MIN_READING_YEAR));
    }
    Ok(date)
}

fn meter_type_from(raw: &str) -> Result<MeterType, String> {
    raw.parse()
        .map_err(|_| "meter_type must be one of: electric, water, gas, heat, other".to_string())
}

fn input_method_from(raw: &str) -> Result<InputMethod, String> {
    raw.parse()
        .map_err(|_| "input_method must be one of: manual, photo, ocr".to_string())
}

pub fn validate_new_meter(input: &MeterInput) -> Result<NewMeter, ValidationErrors> {
    let mut errors = Collector::default();

    let name = match input.name.as_deref().map(str::trim) {
        None | Some("") => {
            errors.push("name is required");
            String::new()
        }
        Some(name) => {
            errors.max_len("name", name, NAME_MAX);
            name.to_string()
        }
    };
    let mut meter = NewMeter::new(name);

    if let Some(location) = &input.location {
        errors.max_len("location", location, LOCATION_MAX);
        meter.location = Some(location.clone()).filter(|l| !l.is_empty());
    }
    if let Some(raw) = &input.meter_type {
        match meter_type_from(raw) {
            Ok(meter_type) => meter.meter_type = meter_type,
            Err(e) => errors.push(e),
        }
    }
    if let Some(unit) = &input.unit {
        errors.max_len("unit", unit, UNIT_MAX);
        meter.unit = unit.clone();
    }

    errors.finish(meter)
}

pub fn validate_meter_update(input: &MeterInput) -> Result<MeterUpdate, ValidationErrors> {
    let mut errors = Collector::default();
    let mut update = MeterUpdate::default();

    if let Some(name) = &input.name {
        let name = name.trim();
        if name.is_empty() {
            errors.push("name cannot be empty");
        }
        errors.max_len("name", name, NAME_MAX);
        update.name = Some(name.to_string());
    }
    if let Some(location) = &input.location {
        errors.max_len("location", location, LOCATION_MAX);
        update.location = Some(location.clone());
    }
    if let Some(raw) = &input.meter_type {
        match meter_type_from(raw) {
            Ok(meter_type) => update.meter_type = Some(meter_type),
            Err(e) => errors.push(e),
        }
    }
    if let Some(unit) = &input.unit {
        errors.max_len("unit", unit, UNIT_MAX);
        update.unit = Some(unit.clone());
    }

    if input.name.is_none()
        && input.location.is_none()
        && input.meter_type.is_none()
        && input.unit.is_none()
    {
        errors.push("At least one field must be updated");
    }

    errors.finish(update)
}

pub fn validate_new_reading(
    input: &ReadingInput,
    now: DateTime<Utc>,
) -> Result<NewReading, ValidationErrors> {
    let mut errors = Collector::default();

    let meter_id = match &input.meter_id {
        None | Some(Value::Null) => {
            errors.push("meter_id is required");
            0
        }
        Some(raw) => meter_id_from(raw).unwrap_or_else(|e| {
            errors.push(e);
            0
        }),
    };
    let value = match &input.value {
        None | Some(Value::Null) => {
            errors.push("value is required");
            0.0
        }
        Some(raw) => reading_value_from(raw).unwrap_or_else(|e| {
            errors.push(e);
            0.0
        }),
    };
    let mut reading = NewReading::new(meter_id, value);

    if let Some(raw) = &input.reading_date {
        match reading_date_from(raw, now) {
            Ok(date) => reading.reading_date = Some(date),
            Err(e) => errors.push(e),
        }
    }
    if let Some(path) = &input.image_path {
        errors.max_len("image_path", path, IMAGE_PATH_MAX);
        reading.image_path = Some(path.clone());
    }
    if let Some(raw) = &input.input_method {
        match input_method_from(raw) {
            Ok(method) => reading.input_method = method,
            Err(e) => errors.push(e),
        }
    }
    if let Some(notes) = &input.notes {
        errors.max_len("notes", notes, NOTES_MAX);
        reading.notes = Some(notes.clone()).filter(|n| !n.is_empty());
    }

    errors.finish(reading)
}

pub fn validate_reading_update(
    input: &ReadingInput,
    now: DateTime<Utc>,
) -> Result<ReadingUpdate, ValidationErrors> {
    let mut errors = Collector::default();
    let mut update = ReadingUpdate::default();

    if let Some(raw) = &input.value {
        match reading_value_from(raw) {
            Ok(value) => update.value = Some(value),
            Err(e) => errors.push(e),
        }
    }
    if let Some(raw) = &input.reading_date {
        match reading_date_from(raw, now) {
            Ok(date) => update.reading_date = Some(date),
            Err(e) => errors.push(e),
        }
    }
    if let Some(path) = &input.image_path {
        errors.max_len("image_path", path, IMAGE_PATH_MAX);
        update.image_path = Some(path.clone());
    }
    if let Some(raw) = &input.input_method {
        match input_method_from(raw) {
            Ok(method) => update.input_method = Some(method),
            Err(e) => errors.push(e),
        }
    }
    match &input.synced_to_sheets {
        None => {}
        Some(Value::Bool(true)) => update.mark_synced = true,
        Some(Value::Bool(false)) => errors.push("synced_to_sheets can only be set to true"),
        Some(_) => errors.push("synced_to_sheets must be true or false"),
    }
    if let Some(notes) = &input.notes {
        errors.max_len("notes", notes, NOTES_MAX);
        update.notes = Some(notes.clone());
    }

    if input.value.is_none()
        && input.reading_date.is_none()
        && input.image_path.is_none()
        && input.input_method.is_none()
        && input.synced_to_sheets.is_none()
        && input.notes.is_none()
    {
        errors.push("At least one field must be updated");
    }

    errors.finish(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn reading_input(value: Value) -> ReadingInput {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_new_meter_defaults() {
        let input = MeterInput {
            name: Some("Lader".to_string()),
            location: Some(String::new()),
            ..Default::default()
        };
        let meter = validate_new_meter(&input).unwrap();
        assert_eq!(meter.name, "Lader");
        assert!(meter.location.is_none());
        assert_eq!(meter.meter_type, MeterType::Electric);
        assert_eq!(meter.unit, "kWh");
    }

    #[test]
    fn test_new_meter_collects_all_errors() {
        let input = MeterInput {
            name: None,
            location: Some("x".repeat(201)),
            meter_type: Some("nuclear".to_string()),
            unit: Some("x".repeat(21)),
        };
        let errors = validate_new_meter(&input).unwrap_err();
        assert_eq!(errors.0.len(), 4);
        assert!(errors.0.contains(&"name is required".to_string()));
        assert!(errors.0.iter().any(|e| e.contains("meter_type")));
    }

    #[test]
    fn test_name_length_counts_characters() {
        let input = MeterInput {
            name: Some("å".repeat(100)),
            ..Default::default()
        };
        assert!(validate_new_meter(&input).is_ok());
    }

    #[test]
    fn test_meter_update_requires_a_field() {
        let errors = validate_meter_update(&MeterInput::default()).unwrap_err();
        assert_eq!(errors.0, vec!["At least one field must be updated".to_string()]);

        let update = validate_meter_update(&MeterInput {
            meter_type: Some("water".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(update.meter_type, Some(MeterType::Water));
    }

    #[test]
    fn test_new_reading_valid() {
        let input = reading_input(json!({
            "meter_id": "3",
            "value": 1234.567,
            "reading_date": "2024-05-31T10:00:00Z",
            "input_method": "photo",
            "notes": ""
        }));
        let reading = validate_new_reading(&input, now()).unwrap();
        assert_eq!(reading.meter_id, 3);
        assert_eq!(reading.value, 1234.567);
        assert_eq!(
            reading.reading_date,
            Some(Utc.with_ymd_and_hms(2024, 5, 31, 10, 0, 0).unwrap())
        );
        assert_eq!(reading.input_method, InputMethod::Photo);
        assert!(reading.notes.is_none());
    }

    #[test]
    fn test_new_reading_collects_errors() {
        let input = reading_input(json!({
            "meter_id": -1,
            "value": 1.2345,
            "reading_date": "2030-01-01T00:00:00Z",
            "input_method": "guess"
        }));
        let errors = validate_new_reading(&input, now()).unwrap_err();
        assert_eq!(
            errors.0,
            vec![
                "meter_id must be a positive number".to_string(),
                "value can have at most 3 decimals".to_string(),
                "reading_date cannot be in the future".to_string(),
                "input_method must be one of: manual, photo, ocr".to_string(),
            ]
        );
    }

    #[test]
    fn test_new_reading_required_fields() {
        let errors = validate_new_reading(&ReadingInput::default(), now()).unwrap_err();
        assert_eq!(
            errors.0,
            vec!["meter_id is required".to_string(), "value is required".to_string()]
        );

        let input = reading_input(json!({ "meter_id": 1.5, "value": "abc" }));
        let errors = validate_new_reading(&input, now()).unwrap_err();
        assert_eq!(
            errors.0,
            vec![
                "meter_id must be an integer".to_string(),
                "value must be a number".to_string()
            ]
        );
    }

    #[test]
    fn test_reading_update_synced_flag_only_rises() {
        let update =
            validate_reading_update(&reading_input(json!({ "synced_to_sheets": true })), now())
                .unwrap();
        assert!(update.mark_synced);

        let errors =
            validate_reading_update(&reading_input(json!({ "synced_to_sheets": false })), now())
                .unwrap_err();
        assert_eq!(errors.0, vec!["synced_to_sheets can only be set to true".to_string()]);

        let errors = validate_reading_update(&ReadingInput::default(), now()).unwrap_err();
        assert_eq!(errors.0, vec!["At least one field must be updated".to_string()]);
    }

    #[test]
    fn test_parse_reading_date_forms() {
        assert_eq!(
            parse_reading_date("2024-01-02"),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_reading_date("2024-01-02T03:04:05+01:00"),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 2, 4, 5).unwrap())
        );
        assert!(parse_reading_date("2024-01-02T03:04").is_some());
        assert!(parse_reading_date("02.01.2024").is_none());
    }

    #[test]
    fn test_reading_date_before_1970_is_rejected() {
        for raw in ["-0001-01-01", "1900-06-15T10:00:00Z", "1969-12-31T23:59:59Z"] {
            let input = reading_input(json!({ "meter_id": 1, "value": 5, "reading_date": raw }));
            let errors = validate_new_reading(&input, now()).unwrap_err();
            assert_eq!(errors.0, vec!["reading_date cannot be before 1970".to_string()], "{}", raw);
        }

        let errors = validate_reading_update(
            &reading_input(json!({ "reading_date": "-0001-01-01" })),
            now(),
        )
        .unwrap_err();
        assert_eq!(errors.0, vec!["reading_date cannot be before 1970".to_string()]);

        let input = reading_input(json!({ "meter_id": 1, "value": 5, "reading_date": "1970-01-01" }));
        assert!(validate_new_reading(&input, now()).is_ok());
    }

    #[test]
    fn test_parse_positive_id() {
        assert_eq!(parse_positive_id("7"), Ok(7));
        assert!(parse_positive_id("0").is_err());
        assert!(parse_positive_id("abc").is_err());
    }
}
