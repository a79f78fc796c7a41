use serde_json::{json, Value};

use crate::form::OdometerInputMethod;

/// What the photo handed to the model shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Receipt,
    Odometer,
}

impl ImageKind {
    /// The odometer is read from the receipt unless the user sent a
    /// separate dashboard photo.
    pub fn for_odometer_method(method: OdometerInputMethod) -> Self {
        match method {
            OdometerInputMethod::SeparatePhoto => ImageKind::Odometer,
            OdometerInputMethod::OnReceiptPhoto | OdometerInputMethod::Manual => ImageKind::Receipt,
        }
    }
}

pub(crate) const RECEIPT_PROMPT: &str = "Obtain the total cost, gallons purchased, date and time (with time rounded to the whole minute), store brand, and store address from this receipt.";

pub(crate) fn receipt_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "totalCost": {
                "type": "NUMBER",
                "format": "float",
                "description": "Total cost of the fuel purchase"
            },
            "gallonsPurchased": {
                "type": "NUMBER",
                "format": "float",
                "description": "Number of gallons purchased"
            },
            "datetime": {
                "type": "STRING",
                "description": "Date and time of the purchase, formatted as MM/DD/YYYY HH:MM"
            },
            "storeBrand": {
                "type": "STRING",
                "description": "Brand of the gas station"
            },
            "storeAddress": {
                "type": "STRING",
                "description": "Address of the gas station"
            }
        },
        "required": [
            "totalCost",
            "gallonsPurchased",
            "datetime",
            "storeBrand",
            "storeAddress"
        ]
    })
}

pub(crate) fn odometer_prompt(kind: ImageKind) -> &'static str {
    match kind {
        ImageKind::Odometer => "Read the total odometer mileage shown on the vehicle dashboard in this photo. Ignore trip meters. Report whole miles only.",
        ImageKind::Receipt => "Find the vehicle odometer reading written or printed on this gas receipt. Report whole miles only.",
    }
}

pub(crate) fn odometer_schema(kind: ImageKind) -> Value {
    let description = match kind {
        ImageKind::Odometer => "Odometer reading shown on the dashboard, in whole miles",
        ImageKind::Receipt => "Odometer reading noted on the receipt, in whole miles",
    };

    json!({
        "type": "OBJECT",
        "properties": {
            "odometerReading": {
                "type": "INTEGER",
                "description": description
            }
        },
        "required": ["odometerReading"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_kind_follows_method() {
        assert_eq!(
            ImageKind::for_odometer_method(OdometerInputMethod::SeparatePhoto),
            ImageKind::Odometer
        );
        assert_eq!(
            ImageKind::for_odometer_method(OdometerInputMethod::OnReceiptPhoto),
            ImageKind::Receipt
        );
    }

    #[test]
    fn receipt_schema_requires_all_fields() {
        let schema = receipt_schema();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 5);
        for field in required {
            let name = field.as_str().unwrap();
            assert!(schema["properties"].get(name).is_some(), "{name} not described");
        }
    }
}
