use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a reading was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMethod {
    #[default]
    Manual,
    Photo,
    Ocr,
}

impl InputMethod {
    /// Label written to the remote sheet and the Excel export.
    pub fn label(&self) -> &'static str {
        match self {
            InputMethod::Manual => "Manuell",
            InputMethod::Photo => "Bilde",
            InputMethod::Ocr => "OCR",
        }
    }
}

impl fmt::Display for InputMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputMethod::Manual => write!(f, "manual"),
            InputMethod::Photo => write!(f, "photo"),
            InputMethod::Ocr => write!(f, "ocr"),
        }
    }
}

impl FromStr for InputMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(InputMethod::Manual),
            "photo" => Ok(InputMethod::Photo),
            "ocr" => Ok(InputMethod::Ocr),
            _ => Err(format!(
                "Invalid input method '{}'. Valid options: manual, photo, ocr",
                s
            )),
        }
    }
}
