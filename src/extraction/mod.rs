//! Receipt extraction
//!
//! Reads structured fuel-up data out of receipt and odometer photos with a
//! vision model that answers in schema-constrained JSON.

mod gemini;
mod prompts;

pub use gemini::{ExtractionError, GeminiClient};
pub use prompts::ImageKind;

use serde::{Deserialize, Serialize};

/// Data read from a gas receipt. Every field is optional because the model
/// may not find it on a crumpled or faded receipt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptData {
    #[serde(default)]
    pub total_cost: Option<f64>,
    #[serde(default)]
    pub gallons_purchased: Option<f64>,
    /// `MM/DD/YYYY HH:MM`
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub store_brand: Option<String>,
    #[serde(default)]
    pub store_address: Option<String>,
    /// Filled in after odometer resolution, echoed back to the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odometer_reading: Option<u64>,
}

impl ReceiptData {
    /// Datetime with blank strings treated as missing.
    pub fn purchase_datetime(&self) -> Option<&str> {
        self.datetime
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Odometer value read from a photo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OdometerData {
    pub odometer_reading: Option<u64>,
}

impl OdometerData {
    pub(crate) fn from_json(value: &serde_json::Value) -> Self {
        let odometer_reading = value.get("odometerReading").and_then(parse_reading);
        Self { odometer_reading }
    }
}

/// Accept integers, floats (dashboards show tenths) and digit strings.
fn parse_reading(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        serde_json::Value::String(s) => {
            // Drops thousands separators and unit suffixes but keeps tenths.
            let number: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            let number = number.trim_matches('.');
            if number.is_empty() {
                return None;
            }
            number.parse::<f64>().ok().map(|f| f.round() as u64)
        }
        _ => None,
    }
}
