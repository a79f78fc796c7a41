//! Vehicle list shown in the form
//!
//! LubeLogger returns every vehicle in the garage. A vehicle can be hidden
//! from the receipt form with an extra field `showInReceiptApp = false`.

use serde::{Deserialize, Serialize};

const VISIBILITY_FIELD: &str = "showInReceiptApp";

/// Vehicle record as returned by LubeLogger's `/api/vehicles`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LubeLoggerVehicle {
    pub id: serde_json::Value,
    #[serde(default)]
    pub year: Option<serde_json::Value>,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub extra_fields: Vec<ExtraField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtraField {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Vehicle as offered to the form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSummary {
    pub vehicle_id: serde_json::Value,
    pub year: Option<serde_json::Value>,
    pub make: Option<String>,
    pub model: Option<String>,
}

impl VehicleSummary {
    /// Identifier as sent back in the `vehicleId` form field.
    pub fn id_string(&self) -> String {
        match &self.vehicle_id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn display_name(&self) -> String {
        let year = match &self.year {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        [year.as_str(), self.make.as_deref().unwrap_or(""), self.model.as_deref().unwrap_or("")]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Response body of `GET /vehicles`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleList {
    pub vehicles: Vec<VehicleSummary>,
}

impl LubeLoggerVehicle {
    pub fn is_shown_in_receipt_app(&self) -> bool {
        !self
            .extra_fields
            .iter()
            .any(|field| field.name == VISIBILITY_FIELD && field.value == "false")
    }
}

pub fn visible_vehicles(records: Vec<LubeLoggerVehicle>) -> Vec<VehicleSummary> {
    records
        .into_iter()
        .filter(LubeLoggerVehicle::is_shown_in_receipt_app)
        .map(|v| VehicleSummary {
            vehicle_id: v.id,
            year: v.year,
            make: v.make,
            model: v.model,
        })
        .collect()
}
