use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use super::fields::{FormField, GasForm, OdometerInputMethod};

/// Validation messages keyed by field, in form display order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<FormField, String>);

impl FieldErrors {
    pub fn insert(&mut self, field: FormField, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    #[allow(dead_code)]
    pub fn get(&self, field: FormField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: FormField) -> bool {
        self.0.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FormField, &str)> {
        self.0.iter().map(|(field, message)| (*field, message.as_str()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in self.iter() {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", field.wire_name(), message)?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for FieldErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, message) in &self.0 {
            map.serialize_entry(field.wire_name(), message)?;
        }
        map.end()
    }
}

impl GasForm {
    /// Check required fields. Inputs hidden by the odometer method are not
    /// required and their values are ignored.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();

        if self.vehicle_id.trim().is_empty() {
            errors.insert(FormField::VehicleId, "Please select a vehicle.");
        }

        if self.receipt_photo.as_ref().map_or(true, |p| p.is_empty()) {
            errors.insert(FormField::ReceiptPhoto, "Please upload a photo of the receipt.");
        }

        match self.odometer_input_method {
            None => {
                errors.insert(
                    FormField::OdometerInputMethod,
                    "Please choose how you will provide the odometer reading.",
                );
            }
            Some(OdometerInputMethod::SeparatePhoto) => {
                if self.odometer_photo.as_ref().map_or(true, |p| p.is_empty()) {
                    errors.insert(FormField::OdometerPhoto, "Please upload a photo of the odometer.");
                }
            }
            Some(OdometerInputMethod::Manual) => {
                let reading = self.odometer_reading.trim();
                if reading.is_empty() {
                    errors.insert(FormField::OdometerReading, "Please enter the odometer reading.");
                } else if !reading.bytes().all(|b| b.is_ascii_digit()) {
                    errors.insert(
                        FormField::OdometerReading,
                        "Odometer reading must be a whole number.",
                    );
                }
            }
            Some(OdometerInputMethod::OnReceiptPhoto) => {}
        }

        if self.filled_to_full.is_none() {
            errors.insert(
                FormField::FilledToFull,
                "Please tell us whether you filled the tank to full.",
            );
        }

        if self.filled_last_time.is_none() {
            errors.insert(
                FormField::FilledLastTime,
                "Please tell us whether you logged your last fill-up.",
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
