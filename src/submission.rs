//! Gas record pipeline
//!
//! Turns a validated form into a LubeLogger gas record: read the receipt,
//! resolve the odometer, upload the photos, compose notes and post the record.

use chrono::{DateTime, Utc};
use chrono_tz::US::Eastern;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::extraction::{ExtractionError, ImageKind, ReceiptData};
use crate::form::{GasForm, OdometerInputMethod, YesNo};
use crate::lubelogger::{GasRecord, UpstreamError};
use crate::state::AppState;

/// Recorded when the odometer cannot be determined.
pub const UNKNOWN_ODOMETER: u64 = 999_999;

const MISSING_DATE_NOTE: &str =
    "\n\nNote: The date was not found on the receipt, so the current time was used instead.";

const UNREAD_ODOMETER_NOTE: &str =
    "\n\nNote: The odometer could not be read, so 999999 was recorded as a placeholder.";

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("receiptPhoto is required")]
    MissingReceipt,

    #[error("Error reading receipt: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Error uploading documents: {0}")]
    Upload(UpstreamError),

    #[error("Error sending data to LubeLogger: {0}")]
    Record(UpstreamError),
}

/// Body returned by `POST /submitGas` on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub message: String,
    pub receipt_data: ReceiptData,
    pub lube_logger_response: Value,
}

/// Where the odometer value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OdometerResolution {
    pub reading: u64,
    pub read_ok: bool,
}

impl OdometerResolution {
    fn read(reading: Option<u64>) -> Self {
        match reading {
            Some(reading) => Self { reading, read_ok: true },
            None => Self {
                reading: UNKNOWN_ODOMETER,
                read_ok: false,
            },
        }
    }
}

pub async fn submit_gas(
    state: &AppState,
    form: &GasForm,
    user_name: &str,
) -> Result<SubmitResponse, SubmitError> {
    let Some(receipt_photo) = form.receipt_photo.as_ref() else {
        return Err(SubmitError::MissingReceipt);
    };
    let method = form
        .odometer_input_method
        .unwrap_or(OdometerInputMethod::OnReceiptPhoto);

    info!("Extracting data from receipt photo");
    let mut receipt = state.extractor.extract_receipt(receipt_photo).await?;

    let odometer = match method {
        OdometerInputMethod::Manual => {
            info!("Using manual odometer reading provided by user");
            OdometerResolution::read(form.effective_odometer_reading().and_then(|r| r.parse().ok()))
        }
        OdometerInputMethod::SeparatePhoto | OdometerInputMethod::OnReceiptPhoto => {
            let kind = ImageKind::for_odometer_method(method);
            let photo = match kind {
                ImageKind::Odometer => form.effective_odometer_photo().unwrap_or(receipt_photo),
                ImageKind::Receipt => receipt_photo,
            };
            info!(?kind, "Extracting odometer reading from photo");
            match state.extractor.extract_odometer(photo, kind).await {
                Ok(data) => OdometerResolution::read(data.odometer_reading),
                Err(err) => {
                    warn!(error = %err, "Odometer extraction failed, recording placeholder");
                    OdometerResolution::read(None)
                }
            }
        }
    };
    if !odometer.read_ok {
        warn!("No odometer reading found");
    }
    receipt.odometer_reading = Some(odometer.reading);

    let mut uploads = vec![receipt_photo];
    if let Some(photo) = form.effective_odometer_photo() {
        uploads.push(photo);
    }
    info!(count = uploads.len(), "Uploading photos to LubeLogger");
    let files = state
        .lubelogger
        .upload_documents(&uploads)
        .await
        .map_err(|err| {
            error!(error = %err, "Document upload failed");
            SubmitError::Upload(err)
        })?;

    let now = Utc::now();
    let record = build_gas_record(form, &receipt, odometer, files, user_name, now);
    if receipt.purchase_datetime().is_none() {
        receipt.datetime = Some(fallback_receipt_datetime(now));
    }
    info!(vehicle_id = %form.vehicle_id, "Sending gas record to LubeLogger");
    let lube_logger_response = state
        .lubelogger
        .add_gas_record(form.vehicle_id.trim(), &record)
        .await
        .map_err(|err| {
            error!(error = %err, notes = %record.notes, "Gas record submission failed");
            SubmitError::Record(err)
        })?;

    info!("Gas submission completed");
    Ok(SubmitResponse {
        message: "Form submitted successfully".to_string(),
        receipt_data: receipt,
        lube_logger_response,
    })
}

/// Receipt-style `MM/DD/YYYY HH:MM` stamp in US/Eastern, used when the
/// receipt shows no date.
fn fallback_receipt_datetime(now: DateTime<Utc>) -> String {
    now.with_timezone(&Eastern).format("%m/%d/%Y %H:%M").to_string()
}

/// Assemble the LubeLogger record. `now` is the submission time.
pub fn build_gas_record(
    form: &GasForm,
    receipt: &ReceiptData,
    odometer: OdometerResolution,
    files: Value,
    user_name: &str,
    now: DateTime<Utc>,
) -> GasRecord {
    let submitted_at = now
        .with_timezone(&Eastern)
        .format("%Y-%m-%d %H:%M:%S %Z")
        .to_string();

    let receipt_date = receipt.purchase_datetime().map(str::to_string);
    let date = receipt_date.clone().unwrap_or_else(|| submitted_at.clone());
    let dated = receipt_date.unwrap_or_else(|| fallback_receipt_datetime(now));

    let mut notes = format!(
        "Brand: {}\nAddress: {}\nReceipt dated {}\n(Submitted by {} at {})",
        receipt.store_brand.as_deref().unwrap_or(""),
        receipt.store_address.as_deref().unwrap_or(""),
        dated,
        user_name,
        submitted_at,
    );
    if receipt.purchase_datetime().is_none() {
        notes.push_str(MISSING_DATE_NOTE);
    }
    if !odometer.read_ok {
        notes.push_str(UNREAD_ODOMETER_NOTE);
    }

    GasRecord {
        date,
        odometer: Some(odometer.reading),
        fuel_consumed: receipt.gallons_purchased,
        cost: receipt.total_cost,
        is_fill_to_full: form.filled_to_full.is_some_and(YesNo::is_yes),
        missed_fuel_up: !form.filled_last_time.is_some_and(YesNo::is_yes),
        notes,
        files: if files.is_null() { Value::Array(Vec::new()) } else { files },
    }
}
