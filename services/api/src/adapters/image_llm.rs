//! services/api/src/adapters/image_llm.rs
//!
//! This module contains the adapter for the illustration model.
//! It implements the `ImageGenerationService` port from the `core` crate by
//! calling the Gemini `generateContent` REST endpoint directly.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use storybook_core::ports::{ImageData, ImageGenerationService, PortError, PortResult};
use tracing::{info, warn};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ImageGenerationService` using a Gemini image model.
#[derive(Clone)]
pub struct GeminiImageAdapter {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl GeminiImageAdapter {
    /// Creates a new `GeminiImageAdapter`.
    pub fn new(client: reqwest::Client, api_base: String, api_key: String, model: String) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }
}

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
}

#[derive(Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text { text: String },
    Inline { inline_data: RequestBlob },
}

#[derive(Serialize)]
struct RequestBlob {
    mime_type: String,
    data: String,
}

#[derive(Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(rename = "inlineData", alias = "inline_data")]
    inline_data: Option<ResponseBlob>,
}

#[derive(Deserialize)]
struct ResponseBlob {
    #[serde(rename = "mimeType", alias = "mime_type")]
    mime_type: Option<String>,
    data: String,
}

//=========================================================================================
// `ImageGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ImageGenerationService for GeminiImageAdapter {
    async fn generate_image(
        &self,
        prompt: &str,
        reference_image: Option<&ImageData>,
    ) -> PortResult<Option<ImageData>> {
        let mut parts = vec![RequestPart::Text {
            text: prompt.to_string(),
        }];
        if let Some(reference) = reference_image {
            parts.push(RequestPart::Inline {
                inline_data: RequestBlob {
                    mime_type: reference.mime_type.clone(),
                    data: STANDARD.encode(&reference.bytes),
                },
            });
        }
        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts,
            }],
        };

        info!(
            "Calling image model {} (prompt {} chars, reference image: {})",
            self.model,
            prompt.len(),
            reference_image.is_some()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body = response.text().await.map_err(request_error)?;
        let image = extract_image(&body)?;
        match &image {
            Some(image) => info!(
                "Image model {} returned {} bytes of {}.",
                self.model,
                image.bytes.len(),
                image.mime_type
            ),
            None => warn!("Image model {} returned no image.", self.model),
        }
        Ok(image)
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Connection failures and timeouts are worth retrying.
fn request_error(e: reqwest::Error) -> PortError {
    if e.is_timeout() {
        PortError::Transient(format!("Image model request timed out: {}", e))
    } else {
        PortError::Transient(format!("Image model request failed: {}", e))
    }
}

fn classify_status(status: StatusCode, body: &str) -> PortError {
    let message = format!("Image model returned {}: {}", status, body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        PortError::Transient(message)
    } else {
        PortError::Fatal(message)
    }
}

/// Pulls the first inline image out of a `generateContent` response body.
/// Text parts are logged and discarded.
fn extract_image(body: &str) -> PortResult<Option<ImageData>> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| PortError::Fatal(format!("Failed to parse image model response: {}", e)))?;

    for candidate in response.candidates {
        let Some(content) = candidate.content else {
            if let Some(reason) = candidate.finish_reason {
                warn!("Image candidate finished without content: {}", reason);
            }
            continue;
        };
        for part in content.parts {
            if let Some(text) = part.text {
                info!("Image model said: {}", text);
            }
            if let Some(blob) = part.inline_data {
                let bytes = STANDARD.decode(blob.data.as_bytes()).map_err(|e| {
                    PortError::Fatal(format!("Image data is not valid base64: {}", e))
                })?;
                if bytes.is_empty() {
                    continue;
                }
                let mime = blob.mime_type.unwrap_or_else(|| "image/png".to_string());
                return Ok(Some(ImageData::new(bytes, mime)));
            }
        }
    }
    Ok(None)
}
