//! Optional screenshot analysis through an OpenAI-compatible vision endpoint.
//!
//! Hints only ever land in [`FieldDescriptor::vision`]; classification stays
//! with the detector.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{FieldDescriptor, VisionHint};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o";

const PROMPT: &str = r#"Analyze this screenshot of a web form. List every input field you can see.
Return ONLY a JSON array, no markdown. Each item:
{"label": "visible label", "type": "email|password|text|phone|date|select|checkbox|...", "required": true|false, "hints": "format or validation notes"}"#;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("could not read screenshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("vision request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("vision API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("unexpected vision response: {0}")]
    Malformed(String),
}

pub struct VisionClient {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl VisionClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// `None` when `OPENAI_API_KEY` is unset or empty. `FORMPILOT_VISION_URL`
    /// and `FORMPILOT_VISION_MODEL` override the endpoint and model.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
        let mut client = Self::new(key);
        if let Ok(url) = std::env::var("FORMPILOT_VISION_URL") {
            client = client.with_endpoint(url);
        }
        if let Ok(model) = std::env::var("FORMPILOT_VISION_MODEL") {
            client = client.with_model(model);
        }
        Some(client)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub async fn analyze_screenshot(&self, path: &Path) -> Result<Vec<VisionHint>, VisionError> {
        let png = tokio::fs::read(path).await?;
        let image_url = format!("data:image/png;base64,{}", STANDARD.encode(&png));
        debug!(target: "formpilot::vision", "[Vision] Sending {} bytes to {}", png.len(), self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.model,
                "temperature": 0.0,
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": PROMPT},
                        {"type": "image_url", "image_url": {"url": image_url}},
                    ],
                }],
            }))
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;

        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("Unknown API error")
                .to_string();
            warn!(target: "formpilot::vision", "[Vision] API error ({status}): {message}");
            return Err(VisionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| VisionError::Malformed(body.to_string()))?;

        let hints = parse_hints(content)?;
        info!(target: "formpilot::vision", "[Vision] {} field hints", hints.len());
        Ok(hints)
    }
}

/// Analyze with the environment-configured client; `Ok(None)` when no key is
/// configured.
pub async fn analyze_screenshot(path: &Path) -> Result<Option<Vec<VisionHint>>, VisionError> {
    match VisionClient::from_env() {
        Some(client) => client.analyze_screenshot(path).await.map(Some),
        None => {
            debug!(target: "formpilot::vision", "[Vision] OPENAI_API_KEY not set, skipping");
            Ok(None)
        }
    }
}

/// Model output to hints. Markdown fences around the array are tolerated.
pub fn parse_hints(content: &str) -> Result<Vec<VisionHint>, VisionError> {
    let cleaned = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(cleaned).map_err(|e| VisionError::Malformed(format!("{e}: {cleaned}")))
}

fn matches_hint(field: &FieldDescriptor, label: &str) -> bool {
    [
        Some(field.label.as_str()),
        field.placeholder.as_deref(),
        field.aria_label.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(|t| t.trim().to_lowercase())
    .filter(|t| !t.is_empty())
    .any(|t| t.contains(label) || label.contains(&t))
}

/// Attach the first matching hint to each field without one. Returns how many
/// fields received a hint.
pub fn merge_hints(fields: &mut [FieldDescriptor], hints: &[VisionHint]) -> usize {
    let mut merged = 0;
    for field in fields.iter_mut().filter(|f| f.vision.is_none()) {
        let hint = hints.iter().find(|h| {
            let label = h.label.trim().to_lowercase();
            !label.is_empty() && matches_hint(field, &label)
        });
        if let Some(hint) = hint {
            debug!(
                target: "formpilot::vision",
                "[Vision] {} <- {:?} ({})", field.display_name(), hint.label, hint.field_type
            );
            field.vision = Some(hint.clone());
            merged += 1;
        }
    }
    merged
}
