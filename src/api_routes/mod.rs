use crate::auth::{Authenticated, Claims};
use crate::error::AppError;
use crate::form::{FieldErrors, FormField, GasForm, Upload};
use crate::state::AppState;
use crate::submission::{self, SubmitError, SubmitResponse};
use crate::vehicles::{visible_vehicles, VehicleList};
use axum::{
    extract::{multipart::MultipartRejection, Json, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

const UNKNOWN_USER: &str = "unknown user";

// --- Form decoding ---

/// Read the multipart body into a form. Values that cannot be parsed are
/// reported per field alongside the required-field checks.
async fn read_form(mut multipart: Multipart) -> Result<(GasForm, FieldErrors), AppError> {
    let mut form = GasForm::default();
    let mut parse_errors = FieldErrors::default();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            "receiptPhoto" | "odometerPhoto" => {
                let file_name = field.file_name().unwrap_or(&name).to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                // Browsers send an empty part for an untouched file input.
                if bytes.is_empty() {
                    continue;
                }
                let upload = Upload::new(file_name, content_type, bytes.to_vec());
                if name == "receiptPhoto" {
                    form.receipt_photo = Some(upload);
                } else {
                    form.odometer_photo = Some(upload);
                }
            }
            "vehicleId" => form.vehicle_id = field.text().await?.trim().to_string(),
            "odometerReading" => form.odometer_reading = field.text().await?,
            "odometerInputMethod" => match field.text().await?.parse() {
                Ok(method) => form.odometer_input_method = Some(method),
                Err(message) => parse_errors.insert(FormField::OdometerInputMethod, message),
            },
            "filledToFull" => match field.text().await?.parse() {
                Ok(answer) => form.filled_to_full = Some(answer),
                Err(message) => parse_errors.insert(FormField::FilledToFull, message),
            },
            "filledLastTime" => match field.text().await?.parse() {
                Ok(answer) => form.filled_last_time = Some(answer),
                Err(message) => parse_errors.insert(FormField::FilledLastTime, message),
            },
            "userName" => {
                let user_name = field.text().await?.trim().to_string();
                form.user_name = Some(user_name).filter(|n| !n.is_empty());
            }
            _ => {}
        }
    }

    Ok((form, parse_errors))
}

fn submitting_user(form: &GasForm, claims: &Claims) -> String {
    form.user_name
        .as_deref()
        .or_else(|| claims.display_name())
        .or_else(|| claims.subject())
        .unwrap_or(UNKNOWN_USER)
        .to_string()
}

impl From<SubmitError> for AppError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::MissingReceipt => AppError::MalformedForm(err.to_string()),
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

// --- Handlers ---

async fn submit_gas(
    State(state): State<Arc<AppState>>,
    Authenticated(claims): Authenticated,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SubmitResponse>, AppError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("submit_gas", %request_id);

    async move {
        info!("Starting gas submission");
        let multipart =
            multipart.map_err(|rejection| AppError::MalformedForm(rejection.body_text()))?;
        let (form, parse_errors) = read_form(multipart).await?;

        let mut errors = form.validate().err().unwrap_or_default();
        for (field, message) in parse_errors.iter() {
            errors.insert(field, message);
        }
        if !errors.is_empty() {
            warn!(%errors, "Validation failed");
            return Err(AppError::Validation(errors));
        }

        let user_name = submitting_user(&form, &claims);
        let response = submission::submit_gas(&state, &form, &user_name).await?;
        Ok(Json(response))
    }
    .instrument(span)
    .await
}

async fn list_vehicles(
    State(state): State<Arc<AppState>>,
    Authenticated(_claims): Authenticated,
) -> Result<Json<VehicleList>, AppError> {
    let records = state.lubelogger.list_vehicles().await.map_err(|err| {
        warn!(error = %err, "Failed to fetch vehicles");
        AppError::BadGateway(format!("Failed to fetch vehicles: {err}"))
    })?;

    Ok(Json(VehicleList {
        vehicles: visible_vehicles(records),
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.lubelogger.ping().await {
        Ok(200) => (StatusCode::OK, Json(json!({ "status": "OK" }))),
        Ok(status) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": format!("LubeLogger returned status {status}") })),
        ),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": format!("Failed to reach LubeLogger: {err}") })),
        ),
    }
}

/// A valid access token is required to access this route.
async fn auth_test(Authenticated(claims): Authenticated) -> Json<Claims> {
    Json(claims)
}

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/submitGas", post(submit_gas))
        .route("/vehicles", get(list_vehicles))
        .route("/health", get(health))
        .route("/authTest", get(auth_test))
}
