use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::meter_type::MeterType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meter {
    pub id: i64,
    pub name: String,
    pub location: Option<String>,
    pub meter_type: MeterType,
    pub unit: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A meter that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMeter {
    pub name: String,
    pub location: Option<String>,
    pub meter_type: MeterType,
    pub unit: String,
}

impl NewMeter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
            meter_type: MeterType::default(),
            unit: "kWh".to_string(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_meter_type(mut self, meter_type: MeterType) -> Self {
        self.meter_type = meter_type;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Partial update of a meter. `None` leaves a field untouched; an empty
/// location clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterUpdate {
    pub name: Option<String>,
    pub location: Option<String>,
    pub meter_type: Option<MeterType>,
    pub unit: Option<String>,
}

impl MeterUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.location.is_none()
            && self.meter_type.is_none()
            && self.unit.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestReading {
    pub value: f64,
    pub reading_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterWithLatestReading {
    #[serde(flatten)]
    pub meter: Meter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_reading: Option<LatestReading>,
}

impl fmt::Display for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", "=".repeat(self.name.chars().count()))?;
        writeln!(f, "ID:       {}", self.id)?;
        writeln!(f, "Type:     {}", self.meter_type)?;
        writeln!(f, "Unit:     {}", self.unit)?;
        if let Some(location) = &self.location {
            writeln!(f, "Location: {}", location)?;
        }
        write!(f, "Created:  {}", self.created_at.format("%Y-%m-%d %H:%M"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_meter_defaults() {
        let meter = NewMeter::new("Lader");
        assert_eq!(meter.name, "Lader");
        assert_eq!(meter.meter_type, MeterType::Electric);
        assert_eq!(meter.unit, "kWh");
        assert!(meter.location.is_none());
    }

    #[test]
    fn test_new_meter_builder() {
        let meter = NewMeter::new("Hovedvann")
            .with_location("Kjeller")
            .with_meter_type(MeterType::Water)
            .with_unit("m3");
        assert_eq!(meter.location.as_deref(), Some("Kjeller"));
        assert_eq!(meter.meter_type, MeterType::Water);
        assert_eq!(meter.unit, "m3");
    }

    #[test]
    fn test_meter_update_is_empty() {
        assert!(MeterUpdate::default().is_empty());
        let update = MeterUpdate {
            unit: Some("MWh".into()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_meter_with_latest_reading_flattens() {
        let now = Utc::now();
        let meter = MeterWithLatestReading {
            meter: Meter {
                id: 7,
                name: "Lader".into(),
                location: None,
                meter_type: MeterType::Electric,
                unit: "kWh".into(),
                created_at: now,
                updated_at: now,
            },
            latest_reading: None,
        };
        let json = serde_json::to_value(&meter).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["meter_type"], "electric");
        assert!(json.get("latest_reading").is_none());
    }
}
