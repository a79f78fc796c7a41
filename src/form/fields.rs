use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// How the user reports the odometer reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OdometerInputMethod {
    /// A second photo showing the dashboard odometer
    SeparatePhoto,
    /// The reading is written on the receipt itself
    OnReceiptPhoto,
    /// Typed in by hand
    Manual,
}

impl OdometerInputMethod {
    pub const ALL: [OdometerInputMethod; 3] = [
        OdometerInputMethod::SeparatePhoto,
        OdometerInputMethod::OnReceiptPhoto,
        OdometerInputMethod::Manual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OdometerInputMethod::SeparatePhoto => "separate_photo",
            OdometerInputMethod::OnReceiptPhoto => "on_receipt_photo",
            OdometerInputMethod::Manual => "manual",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OdometerInputMethod::SeparatePhoto => "Separate photo",
            OdometerInputMethod::OnReceiptPhoto => "On receipt photo",
            OdometerInputMethod::Manual => "Manual entry",
        }
    }
}

impl fmt::Display for OdometerInputMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OdometerInputMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "separate_photo" => Ok(OdometerInputMethod::SeparatePhoto),
            "on_receipt_photo" => Ok(OdometerInputMethod::OnReceiptPhoto),
            "manual" => Ok(OdometerInputMethod::Manual),
            other => Err(format!(
                "Unknown odometer input method '{other}' (expected separate_photo, on_receipt_photo or manual)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YesNo {
    Yes,
    No,
}

impl YesNo {
    pub fn as_str(self) -> &'static str {
        match self {
            YesNo::Yes => "yes",
            YesNo::No => "no",
        }
    }

    pub fn is_yes(self) -> bool {
        self == YesNo::Yes
    }
}

impl fmt::Display for YesNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for YesNo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(YesNo::Yes),
            "no" => Ok(YesNo::No),
            other => Err(format!("Expected 'yes' or 'no', got '{other}'")),
        }
    }
}

/// A file-valued form field.
#[derive(Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read a photo from disk, guessing its content type from the extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("photo")
            .to_string();
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Inputs the form can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormField {
    VehicleId,
    ReceiptPhoto,
    OdometerInputMethod,
    OdometerPhoto,
    OdometerReading,
    FilledToFull,
    FilledLastTime,
}

impl FormField {
    /// Multipart field name, also used as the key in validation errors.
    pub fn wire_name(self) -> &'static str {
        match self {
            FormField::VehicleId => "vehicleId",
            FormField::ReceiptPhoto => "receiptPhoto",
            FormField::OdometerInputMethod => "odometerInputMethod",
            FormField::OdometerPhoto => "odometerPhoto",
            FormField::OdometerReading => "odometerReading",
            FormField::FilledToFull => "filledToFull",
            FormField::FilledLastTime => "filledLastTime",
        }
    }
}

/// One fuel-up as entered by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GasForm {
    pub vehicle_id: String,
    pub receipt_photo: Option<Upload>,
    pub odometer_input_method: Option<OdometerInputMethod>,
    pub odometer_photo: Option<Upload>,
    pub odometer_reading: String,
    pub filled_to_full: Option<YesNo>,
    pub filled_last_time: Option<YesNo>,
    pub user_name: Option<String>,
}

impl GasForm {
    /// Inputs shown for the current odometer method, in display order.
    pub fn visible_fields(&self) -> Vec<FormField> {
        let mut fields = vec![
            FormField::VehicleId,
            FormField::ReceiptPhoto,
            FormField::OdometerInputMethod,
        ];
        match self.odometer_input_method {
            Some(OdometerInputMethod::SeparatePhoto) => fields.push(FormField::OdometerPhoto),
            Some(OdometerInputMethod::Manual) => fields.push(FormField::OdometerReading),
            Some(OdometerInputMethod::OnReceiptPhoto) | None => {}
        }
        fields.push(FormField::FilledToFull);
        fields.push(FormField::FilledLastTime);
        fields
    }

    pub fn is_visible(&self, field: FormField) -> bool {
        self.visible_fields().contains(&field)
    }

    /// Switch the odometer method, dropping inputs the new method hides.
    pub fn select_odometer_method(&mut self, method: OdometerInputMethod) {
        self.odometer_input_method = Some(method);
        if method != OdometerInputMethod::SeparatePhoto {
            self.odometer_photo = None;
        }
        if method != OdometerInputMethod::Manual {
            self.odometer_reading.clear();
        }
    }

    /// Odometer photo, only when the current method uses it.
    pub fn effective_odometer_photo(&self) -> Option<&Upload> {
        match self.odometer_input_method {
            Some(OdometerInputMethod::SeparatePhoto) => self.odometer_photo.as_ref(),
            _ => None,
        }
    }

    /// Trimmed manual reading, only when the current method uses it.
    pub fn effective_odometer_reading(&self) -> Option<&str> {
        match self.odometer_input_method {
            Some(OdometerInputMethod::Manual) => {
                Some(self.odometer_reading.trim()).filter(|r| !r.is_empty())
            }
            _ => None,
        }
    }

    /// Clear every answer. The user name is a session property and survives.
    pub fn reset(&mut self) {
        let user_name = self.user_name.take();
        *self = GasForm {
            user_name,
            ..GasForm::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(name: &str) -> Upload {
        Upload::new(name, "image/jpeg", vec![0xFF, 0xD8, 0xFF])
    }

    #[test]
    fn visibility_follows_odometer_method() {
        let mut form = GasForm::default();
        assert!(!form.is_visible(FormField::OdometerPhoto));
        assert!(!form.is_visible(FormField::OdometerReading));

        form.select_odometer_method(OdometerInputMethod::SeparatePhoto);
        assert!(form.is_visible(FormField::OdometerPhoto));
        assert!(!form.is_visible(FormField::OdometerReading));

        form.select_odometer_method(OdometerInputMethod::Manual);
        assert!(!form.is_visible(FormField::OdometerPhoto));
        assert!(form.is_visible(FormField::OdometerReading));

        form.select_odometer_method(OdometerInputMethod::OnReceiptPhoto);
        assert_eq!(form.visible_fields().len(), 5);
    }

    #[test]
    fn switching_method_clears_hidden_inputs() {
        let mut form = GasForm::default();
        form.select_odometer_method(OdometerInputMethod::SeparatePhoto);
        form.odometer_photo = Some(photo("dash.jpg"));

        form.select_odometer_method(OdometerInputMethod::Manual);
        assert!(form.odometer_photo.is_none());

        form.odometer_reading = "123456".to_string();
        form.select_odometer_method(OdometerInputMethod::OnReceiptPhoto);
        assert!(form.odometer_reading.is_empty());
    }

    #[test]
    fn effective_inputs_ignore_values_for_other_methods() {
        let form = GasForm {
            odometer_input_method: Some(OdometerInputMethod::OnReceiptPhoto),
            odometer_photo: Some(photo("dash.jpg")),
            odometer_reading: "42".to_string(),
            ..GasForm::default()
        };
        assert!(form.effective_odometer_photo().is_none());
        assert!(form.effective_odometer_reading().is_none());
    }

    #[test]
    fn reset_keeps_user_name_only() {
        let mut form = GasForm {
            vehicle_id: "3".to_string(),
            receipt_photo: Some(photo("receipt.jpg")),
            filled_to_full: Some(YesNo::Yes),
            user_name: Some("Sam".to_string()),
            ..GasForm::default()
        };
        form.reset();
        assert_eq!(
            form,
            GasForm {
                user_name: Some("Sam".to_string()),
                ..GasForm::default()
            }
        );
    }

    #[test]
    fn parses_wire_values() {
        for method in OdometerInputMethod::ALL {
            assert_eq!(method.as_str().parse::<OdometerInputMethod>(), Ok(method));
        }
        assert!("photo".parse::<OdometerInputMethod>().is_err());
        assert_eq!(" YES ".parse::<YesNo>(), Ok(YesNo::Yes));
        assert_eq!("No".parse::<YesNo>(), Ok(YesNo::No));
        assert!("maybe".parse::<YesNo>().is_err());
    }
}
