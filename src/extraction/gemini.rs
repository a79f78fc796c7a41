//! Gemini `generateContent` client.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::prompts::{odometer_prompt, odometer_schema, receipt_schema, RECEIPT_PROMPT};
use super::{ImageKind, OdometerData, ReceiptData};
use crate::config::ExtractionConfig;
use crate::form::Upload;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Vision API key is not configured (set GEMINI_API_KEY)")]
    MissingApiKey,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Vision API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Vision API returned no content")]
    EmptyResponse,

    #[error("Model did not return valid JSON: {0}")]
    InvalidJson(String),
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(config: &ExtractionConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .unwrap_or_else(|_| Client::new());

        if config.api_key.is_none() {
            warn!("GEMINI_API_KEY is not set; receipt extraction will fail");
        }

        Self {
            client,
            base_url: config.api_base_url.trim().trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    pub async fn extract_receipt(&self, photo: &Upload) -> Result<ReceiptData, ExtractionError> {
        let value = self
            .generate_json(photo, RECEIPT_PROMPT, receipt_schema())
            .await?;
        serde_json::from_value(value).map_err(|err| ExtractionError::InvalidJson(err.to_string()))
    }

    pub async fn extract_odometer(
        &self,
        photo: &Upload,
        kind: ImageKind,
    ) -> Result<OdometerData, ExtractionError> {
        let value = self
            .generate_json(photo, odometer_prompt(kind), odometer_schema(kind))
            .await?;
        Ok(OdometerData::from_json(&value))
    }

    async fn generate_json(
        &self,
        photo: &Upload,
        prompt: &str,
        schema: Value,
    ) -> Result<Value, ExtractionError> {
        let api_key = self.api_key.as_deref().ok_or(ExtractionError::MissingApiKey)?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let body = json!({
            "contents": [{
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": image_mime_type(photo),
                            "data": STANDARD.encode(&photo.bytes),
                        }
                    },
                    { "text": prompt }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema,
            }
        });

        debug!(file = %photo.file_name, bytes = photo.bytes.len(), "Sending image to vision model");
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ExtractionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or(ExtractionError::EmptyResponse)?;

        serde_json::from_str(&text).map_err(|_| ExtractionError::InvalidJson(text))
    }
}

fn image_mime_type(photo: &Upload) -> String {
    let declared = photo.content_type.trim();
    if declared.starts_with("image/") {
        return declared.to_string();
    }
    mime_guess::from_path(&photo.file_name)
        .first()
        .filter(|mime| mime.type_() == "image")
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| "image/jpeg".to_string())
}
