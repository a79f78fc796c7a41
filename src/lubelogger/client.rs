//! API client for LubeLogger
//!
//! Reads are retried on transient failures; writes are sent once so that a
//! slow LubeLogger never ends up with duplicate gas records.

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::LubeLoggerConfig;
use crate::form::Upload;
use crate::vehicles::LubeLoggerVehicle;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("LubeLogger server URL is not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("LubeLogger returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("LubeLogger unreachable")]
    Unreachable,
}

/// Gas record body accepted by `/api/vehicle/gasrecords/add`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasRecord {
    pub date: String,
    pub odometer: Option<u64>,
    pub fuel_consumed: Option<f64>,
    pub cost: Option<f64>,
    pub is_fill_to_full: bool,
    pub missed_fuel_up: bool,
    pub notes: String,
    /// Document descriptors exactly as returned by the upload endpoint
    pub files: Value,
}

#[derive(Clone)]
pub struct LubeLoggerClient {
    client: Client,
    health_client: Client,
    base_url: String,
    max_retries: u32,
}

impl LubeLoggerClient {
    pub fn new(config: &LubeLoggerConfig) -> Result<Self, UpstreamError> {
        let base_url = config
            .base_url
            .as_deref()
            .map(normalize_base_url)
            .filter(|url| !url.is_empty())
            .ok_or(UpstreamError::NotConfigured)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()?;
        let health_client = Client::builder()
            .timeout(Duration::from_secs(config.health_timeout_seconds.max(1)))
            .build()?;

        Ok(Self {
            client,
            health_client,
            base_url,
            max_retries: config.max_retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Every vehicle in the garage, unfiltered.
    pub async fn list_vehicles(&self) -> Result<Vec<LubeLoggerVehicle>, UpstreamError> {
        let url = format!("{}/api/vehicles", self.base_url);
        let response = self.get_with_retry(|| self.client.get(&url)).await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    /// Upload photos as documents; the returned JSON is passed through
    /// untouched into the gas record's `files`.
    pub async fn upload_documents(&self, uploads: &[&Upload]) -> Result<Value, UpstreamError> {
        let url = format!("{}/api/documents/upload", self.base_url);
        let mut form = Form::new();
        for upload in uploads {
            let mut part = Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone());
            if !upload.content_type.trim().is_empty() {
                part = part.mime_str(upload.content_type.trim())?;
            }
            form = form.part("documents", part);
        }

        debug!(count = uploads.len(), "Uploading documents to LubeLogger");
        let response = self.client.post(&url).multipart(form).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    pub async fn add_gas_record(
        &self,
        vehicle_id: &str,
        record: &GasRecord,
    ) -> Result<Value, UpstreamError> {
        let url = format!("{}/api/vehicle/gasrecords/add", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("vehicleId", vehicle_id)])
            .json(record)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        // LubeLogger answers with a JSON status object; tolerate an empty body.
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    /// Probe LubeLogger with a short timeout and report the HTTP status.
    pub async fn ping(&self) -> Result<u16, UpstreamError> {
        let url = format!("{}/api/vehicles", self.base_url);
        let response = self.health_client.get(&url).send().await?;
        Ok(response.status().as_u16())
    }

    async fn get_with_retry<F>(&self, build: F) -> Result<Response, UpstreamError>
    where
        F: Fn() -> RequestBuilder,
    {
        let max_attempts = self.max_retries.saturating_add(1).max(1);

        for attempt in 1..=max_attempts {
            match build().send().await {
                Ok(response) => {
                    if attempt < max_attempts && response.status().is_server_error() {
                        warn!(status = %response.status(), attempt, "LubeLogger server error, retrying");
                        sleep(backoff_for_attempt(attempt)).await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) => {
                    if attempt < max_attempts && is_retryable_network_error(&err) {
                        warn!(error = %err, attempt, "LubeLogger unreachable, retrying");
                        sleep(backoff_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(UpstreamError::Network(err));
                }
            }
        }

        Err(UpstreamError::Unreachable)
    }
}

async fn ensure_success(response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(UpstreamError::Status {
        status: status.as_u16(),
        message,
    })
}

fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

fn is_retryable_network_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn backoff_for_attempt(attempt: u32) -> Duration {
    // 200ms, 400ms, 800ms ... capped at 2s
    let exponent = attempt.saturating_sub(1).min(4);
    let factor = 2u64.saturating_pow(exponent);
    let ms = 200u64.saturating_mul(factor).min(2_000);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Json, Multipart, Query},
        http::StatusCode,
        routing::{get, post},
        Router,
    };
    use serde_json::json;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn spawn_server(app: Router) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (addr, handle)
    }

    fn client_for(addr: SocketAddr, max_retries: u32) -> LubeLoggerClient {
        LubeLoggerClient::new(&LubeLoggerConfig {
            base_url: Some(format!("http://{addr}/")),
            timeout_seconds: 2,
            health_timeout_seconds: 1,
            max_retries,
        })
        .unwrap()
    }

    #[test]
    fn missing_base_url_is_rejected() {
        let err = LubeLoggerClient::new(&LubeLoggerConfig::default()).err().unwrap();
        assert!(matches!(err, UpstreamError::NotConfigured));
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff_for_attempt(1), Duration::from_millis(200));
        assert_eq!(backoff_for_attempt(2), Duration::from_millis(400));
        assert_eq!(backoff_for_attempt(10), Duration::from_millis(2_000));
    }

    #[tokio::test]
    async fn list_vehicles_retries_server_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_for_route = Arc::clone(&calls);
        let app = Router::new().route(
            "/api/vehicles",
            get(move || {
                let calls = Arc::clone(&calls_for_route);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({})))
                    } else {
                        (
                            StatusCode::OK,
                            Json(json!([{"id": 1, "year": 2019, "make": "Mazda", "model": "3"}])),
                        )
                    }
                }
            }),
        );
        let (addr, handle) = spawn_server(app).await;

        let vehicles = client_for(addr, 1).list_vehicles().await.unwrap();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        handle.abort();
    }

    #[tokio::test]
    async fn upload_sends_every_file_under_documents() {
        let app = Router::new().route(
            "/api/documents/upload",
            post(|mut multipart: Multipart| async move {
                let mut names = Vec::new();
                while let Some(field) = multipart.next_field().await.unwrap() {
                    assert_eq!(field.name(), Some("documents"));
                    names.push(field.file_name().unwrap_or_default().to_string());
                }
                Json(
                    names
                        .into_iter()
                        .map(|n| json!({"name": n, "location": format!("/documents/{n}")}))
                        .collect::<Vec<_>>(),
                )
            }),
        );
        let (addr, handle) = spawn_server(app).await;

        let receipt = Upload::new("receipt.jpg", "image/jpeg", vec![1, 2]);
        let odometer = Upload::new("dash.jpg", "image/jpeg", vec![3, 4]);
        let files = client_for(addr, 0)
            .upload_documents(&[&receipt, &odometer])
            .await
            .unwrap();

        assert_eq!(files.as_array().unwrap().len(), 2);
        assert_eq!(files[1]["name"], json!("dash.jpg"));

        handle.abort();
    }

    #[tokio::test]
    async fn add_gas_record_passes_vehicle_id_as_query() {
        let app = Router::new().route(
            "/api/vehicle/gasrecords/add",
            post(
                |Query(query): Query<HashMap<String, String>>, Json(body): Json<Value>| async move {
                    assert_eq!(query.get("vehicleId").map(String::as_str), Some("12"));
                    assert_eq!(body["isFillToFull"], json!(true));
                    Json(json!({"success": true, "message": "Gas Record Added"}))
                },
            ),
        );
        let (addr, handle) = spawn_server(app).await;

        let record = GasRecord {
            date: "03/14/2025 08:15".to_string(),
            odometer: Some(1000),
            fuel_consumed: Some(10.0),
            cost: Some(30.0),
            is_fill_to_full: true,
            missed_fuel_up: false,
            notes: String::new(),
            files: json!([]),
        };
        let response = client_for(addr, 0).add_gas_record("12", &record).await.unwrap();
        assert_eq!(response["success"], json!(true));

        handle.abort();
    }

    #[tokio::test]
    async fn add_gas_record_surfaces_status() {
        let app = Router::new().route(
            "/api/vehicle/gasrecords/add",
            post(|| async { (StatusCode::BAD_REQUEST, "bad odometer") }),
        );
        let (addr, handle) = spawn_server(app).await;

        let record = GasRecord {
            date: String::new(),
            odometer: None,
            fuel_consumed: None,
            cost: None,
            is_fill_to_full: false,
            missed_fuel_up: true,
            notes: String::new(),
            files: json!([]),
        };
        let err = client_for(addr, 3).add_gas_record("1", &record).await.unwrap_err();
        assert!(matches!(
            err,
            UpstreamError::Status { status: 400, ref message } if message == "bad odometer"
        ));

        handle.abort();
    }
}
