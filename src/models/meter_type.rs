use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeterType {
    #[default]
    Electric,
    Water,
    Gas,
    Heat,
    Other,
}

impl MeterType {
    /// Human-readable label used in exported spreadsheets.
    pub fn label(&self) -> &'static str {
        match self {
            MeterType::Electric => "Strøm",
            MeterType::Water => "Vann",
            MeterType::Gas => "Gass",
            MeterType::Heat => "Varme",
            MeterType::Other => "Annet",
        }
    }
}

impl fmt::Display for MeterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeterType::Electric => write!(f, "electric"),
            MeterType::Water => write!(f, "water"),
            MeterType::Gas => write!(f, "gas"),
            MeterType::Heat => write!(f, "heat"),
            MeterType::Other => write!(f, "other"),
        }
    }
}

impl FromStr for MeterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "electric" => Ok(MeterType::Electric),
            "water" => Ok(MeterType::Water),
            "gas" => Ok(MeterType::Gas),
            "heat" => Ok(MeterType::Heat),
            "other" => Ok(MeterType::Other),
            _ => Err(format!(
                "Invalid meter type '{}'. Valid options: electric, water, gas, heat, other",
                s
            )),
        }
    }
}
