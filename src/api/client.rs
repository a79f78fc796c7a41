//! Client for the gas receipt API
//!
//! Fetches the vehicle list and submits the fuel-up form as multipart data.

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::form::{FieldErrors, GasForm, OdometerInputMethod, Upload};
use crate::submission::SubmitResponse;
use crate::vehicles::{VehicleList, VehicleSummary};

/// API errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Please fix the form: {0}")]
    Validation(FieldErrors),

    #[error("A submission is already in progress")]
    InFlight,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}

pub struct BackendClient {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl BackendClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()?;

        Ok(Self {
            client,
            base_url: normalize_base_url(&config.backend_url),
            access_token: config
                .access_token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Vehicles offered in the form's vehicle picker.
    pub async fn fetch_vehicles(&self) -> Result<Vec<VehicleSummary>, ClientError> {
        let url = format!("{}/vehicles", self.base_url);
        let response = self.authorized(self.client.get(&url)).send().await?;
        let list: VehicleList = ensure_success(response).await?.json().await?;
        debug!(count = list.vehicles.len(), "Fetched vehicles");
        Ok(list.vehicles)
    }

    /// Post the form to `/submitGas`.
    pub async fn submit(&self, form: &GasForm) -> Result<SubmitResponse, ClientError> {
        let url = format!("{}/submitGas", self.base_url);
        let payload = multipart_payload(form)?;

        info!(vehicle_id = %form.vehicle_id, "Submitting fuel-up");
        let response = self
            .authorized(self.client.post(&url))
            .multipart(payload)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    /// Succeeds when the API reports LubeLogger reachable.
    pub async fn health(&self) -> Result<(), ClientError> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}

fn upload_part(upload: &Upload) -> Result<Part, ClientError> {
    let part = Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone());
    if upload.content_type.trim().is_empty() {
        return Ok(part);
    }
    Ok(part.mime_str(upload.content_type.trim())?)
}

/// Multipart body for `/submitGas`. Inputs hidden by the chosen odometer
/// method are left out.
fn multipart_payload(form: &GasForm) -> Result<Form, ClientError> {
    let mut payload = Form::new().text("vehicleId", form.vehicle_id.trim().to_string());

    if let Some(receipt) = &form.receipt_photo {
        payload = payload.part("receiptPhoto", upload_part(receipt)?);
    }
    if let Some(method) = form.odometer_input_method {
        payload = payload.text("odometerInputMethod", method.as_str());
    }
    match form.odometer_input_method {
        Some(OdometerInputMethod::SeparatePhoto) => {
            if let Some(photo) = form.effective_odometer_photo() {
                payload = payload.part("odometerPhoto", upload_part(photo)?);
            }
        }
        Some(OdometerInputMethod::Manual) => {
            if let Some(reading) = form.effective_odometer_reading() {
                payload = payload.text("odometerReading", reading.to_string());
            }
        }
        _ => {}
    }
    if let Some(answer) = form.filled_to_full {
        payload = payload.text("filledToFull", answer.as_str());
    }
    if let Some(answer) = form.filled_last_time {
        payload = payload.text("filledLastTime", answer.as_str());
    }
    if let Some(user_name) = form.user_name.as_deref().filter(|n| !n.trim().is_empty()) {
        payload = payload.text("userName", user_name.trim().to_string());
    }

    Ok(payload)
}

async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    Err(ClientError::Api {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Pull `detail` (or `error`) out of a JSON error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["detail", "error"]
                .iter()
                .find_map(|key| value.get(key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Outcome of the most recent submit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionStatus {
    Success,
    Error(String),
}

/// The form being filled in, with at most one submission in flight.
pub struct FormSession {
    client: BackendClient,
    form: Mutex<GasForm>,
    status: Mutex<Option<SubmissionStatus>>,
    in_flight: AtomicBool,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FormSession {
    pub fn new(client: BackendClient, form: GasForm) -> Self {
        Self {
            client,
            form: Mutex::new(form),
            status: Mutex::new(None),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn form(&self) -> GasForm {
        lock(&self.form).clone()
    }

    pub fn status(&self) -> Option<SubmissionStatus> {
        lock(&self.status).clone()
    }

    pub async fn submit(&self) -> Result<SubmitResponse, ClientError> {
        let form = self.form();
        form.validate().map_err(ClientError::Validation)?;

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Ignoring submit while another is in flight");
            return Err(ClientError::InFlight);
        }
        let _guard = InFlightGuard(&self.in_flight);
        *lock(&self.status) = None;

        match self.client.submit(&form).await {
            Ok(response) => {
                lock(&self.form).reset();
                *lock(&self.status) = Some(SubmissionStatus::Success);
                Ok(response)
            }
            Err(err) => {
                *lock(&self.status) = Some(SubmissionStatus::Error(err.to_string()));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::YesNo;
    use axum::{
        extract::{Json, Multipart},
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Router,
    };
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::net::SocketAddr;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::Notify;

    async fn spawn_server(app: Router) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (addr, handle)
    }

    fn client_for(addr: SocketAddr, token: Option<&str>) -> BackendClient {
        BackendClient::new(&ClientConfig {
            backend_url: format!("http://{addr}/"),
            access_token: token.map(str::to_string),
            timeout_seconds: 5,
            user_name: None,
        })
        .unwrap()
    }

    fn filled_form(method: OdometerInputMethod) -> GasForm {
        let mut form = GasForm {
            vehicle_id: "3".to_string(),
            receipt_photo: Some(Upload::new("receipt.jpg", "image/jpeg", vec![1, 2, 3])),
            odometer_photo: Some(Upload::new("dash.jpg", "image/jpeg", vec![4, 5])),
            odometer_reading: "98765".to_string(),
            filled_to_full: Some(YesNo::Yes),
            filled_last_time: Some(YesNo::No),
            user_name: Some("Alex".to_string()),
            ..GasForm::default()
        };
        form.odometer_input_method = Some(method);
        form
    }

    fn ok_body() -> Value {
        json!({
            "message": "Form submitted successfully",
            "receiptData": {"totalCost": 40.0},
            "lubeLoggerResponse": {"success": true}
        })
    }

    /// Records the multipart field names (and text values) of every submit.
    fn capturing_backend(seen: Arc<tokio::sync::Mutex<BTreeMap<String, String>>>) -> Router {
        Router::new().route(
            "/submitGas",
            post(move |mut multipart: Multipart| {
                let seen = Arc::clone(&seen);
                async move {
                    while let Some(field) = multipart.next_field().await.unwrap() {
                        let name = field.name().unwrap_or_default().to_string();
                        let value = match field.file_name() {
                            Some(file_name) => format!("file:{file_name}"),
                            None => field.text().await.unwrap(),
                        };
                        seen.lock().await.insert(name, value);
                    }
                    Json(ok_body())
                }
            }),
        )
    }

    #[test]
    fn error_message_prefers_detail() {
        assert_eq!(error_message(r#"{"detail": "Not authenticated"}"#), "Not authenticated");
        assert_eq!(
            error_message(r#"{"error": "LubeLogger returned status 500"}"#),
            "LubeLogger returned status 500"
        );
        assert_eq!(error_message(" bad gateway \n"), "bad gateway");
    }

    #[tokio::test]
    async fn manual_submit_sends_reading_but_not_photo() {
        let seen = Arc::new(tokio::sync::Mutex::new(BTreeMap::new()));
        let (addr, handle) = spawn_server(capturing_backend(Arc::clone(&seen))).await;

        let response = client_for(addr, None)
            .submit(&filled_form(OdometerInputMethod::Manual))
            .await
            .unwrap();
        assert_eq!(response.message, "Form submitted successfully");

        let seen = seen.lock().await;
        assert_eq!(seen["vehicleId"], "3");
        assert_eq!(seen["receiptPhoto"], "file:receipt.jpg");
        assert_eq!(seen["odometerInputMethod"], "manual");
        assert_eq!(seen["odometerReading"], "98765");
        assert_eq!(seen["filledToFull"], "yes");
        assert_eq!(seen["filledLastTime"], "no");
        assert_eq!(seen["userName"], "Alex");
        assert!(!seen.contains_key("odometerPhoto"));

        handle.abort();
    }

    #[tokio::test]
    async fn separate_photo_submit_sends_photo_but_not_reading() {
        let seen = Arc::new(tokio::sync::Mutex::new(BTreeMap::new()));
        let (addr, handle) = spawn_server(capturing_backend(Arc::clone(&seen))).await;

        client_for(addr, None)
            .submit(&filled_form(OdometerInputMethod::SeparatePhoto))
            .await
            .unwrap();

        let seen = seen.lock().await;
        assert_eq!(seen["odometerInputMethod"], "separate_photo");
        assert_eq!(seen["odometerPhoto"], "file:dash.jpg");
        assert!(!seen.contains_key("odometerReading"));

        handle.abort();
    }

    #[tokio::test]
    async fn fetch_vehicles_sends_bearer_token() {
        let app = Router::new().route(
            "/vehicles",
            get(|headers: HeaderMap| async move {
                match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                    Some("Bearer secret-token") => (
                        StatusCode::OK,
                        Json(json!({"vehicles": [
                            {"vehicleId": 7, "year": 2020, "make": "Honda", "model": "Fit"}
                        ]})),
                    ),
                    _ => (
                        StatusCode::FORBIDDEN,
                        Json(json!({"detail": "Not authenticated"})),
                    ),
                }
            }),
        );
        let (addr, handle) = spawn_server(app).await;

        let vehicles = client_for(addr, Some("secret-token"))
            .fetch_vehicles()
            .await
            .unwrap();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0].id_string(), "7");
        assert_eq!(vehicles[0].display_name(), "2020 Honda Fit");

        let err = client_for(addr, None).fetch_vehicles().await.unwrap_err();
        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Not authenticated");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        handle.abort();
    }

    #[tokio::test]
    async fn session_validates_before_sending() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_for_route = Arc::clone(&calls);
        let app = Router::new().route(
            "/submitGas",
            post(move || {
                calls_for_route.fetch_add(1, Ordering::SeqCst);
                async { Json(ok_body()) }
            }),
        );
        let (addr, handle) = spawn_server(app).await;

        let session = FormSession::new(client_for(addr, None), GasForm::default());
        let err = session.submit().await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(ref errors) if errors.len() >= 4));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.status(), None);

        handle.abort();
    }

    #[tokio::test]
    async fn session_resets_form_on_success_and_keeps_it_on_error() {
        let fail = Arc::new(AtomicBool::new(false));
        let fail_for_route = Arc::clone(&fail);
        let app = Router::new().route(
            "/submitGas",
            post(move || {
                let fail = fail_for_route.load(Ordering::SeqCst);
                async move {
                    if fail {
                        (
                            StatusCode::BAD_GATEWAY,
                            Json(json!({"detail": "Error sending data to LubeLogger: boom"})),
                        )
                    } else {
                        (StatusCode::OK, Json(ok_body()))
                    }
                }
            }),
        );
        let (addr, handle) = spawn_server(app).await;

        let session = FormSession::new(
            client_for(addr, None),
            filled_form(OdometerInputMethod::OnReceiptPhoto),
        );

        fail.store(true, Ordering::SeqCst);
        session.submit().await.unwrap_err();
        assert_eq!(
            session.status(),
            Some(SubmissionStatus::Error(
                "API error: 502 - Error sending data to LubeLogger: boom".to_string()
            ))
        );
        assert_eq!(session.form().vehicle_id, "3");

        fail.store(false, Ordering::SeqCst);
        session.submit().await.unwrap();
        assert_eq!(session.status(), Some(SubmissionStatus::Success));
        assert_eq!(session.form().vehicle_id, "");
        assert!(session.form().receipt_photo.is_none());
        assert_eq!(session.form().user_name.as_deref(), Some("Alex"));
        assert!(!session.in_flight.load(Ordering::SeqCst));

        handle.abort();
    }

    #[tokio::test]
    async fn session_rejects_concurrent_submit() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let (entered_route, release_route) = (Arc::clone(&entered), Arc::clone(&release));
        let app = Router::new().route(
            "/submitGas",
            post(move || {
                let entered = Arc::clone(&entered_route);
                let release = Arc::clone(&release_route);
                async move {
                    entered.notify_one();
                    release.notified().await;
                    Json(ok_body())
                }
            }),
        );
        let (addr, handle) = spawn_server(app).await;

        let session = Arc::new(FormSession::new(
            client_for(addr, None),
            filled_form(OdometerInputMethod::OnReceiptPhoto),
        ));
        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.submit().await })
        };

        entered.notified().await;
        assert!(session.in_flight.load(Ordering::SeqCst));
        let err = session.submit().await.unwrap_err();
        assert!(matches!(err, ClientError::InFlight));

        release.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(session.status(), Some(SubmissionStatus::Success));
        assert!(!session.in_flight.load(Ordering::SeqCst));

        handle.abort();
    }
}
