use std::env;
use std::time::Duration;

use easygraph_contracts::chat::InlineFile;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};

use crate::error::TransportError;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const JSON_MIME_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub api_key: String,
    pub model: String,
    pub system_instruction: String,
    pub text: String,
    pub attachments: Vec<InlineFile>,
    pub response_mime_type: String,
}

/// One blocking call to a generative endpoint; returns the reply text.
pub trait GenerationTransport: Send + Sync {
    fn generate_content(&self, request: &GenerationRequest) -> Result<String, TransportError>;
}

pub struct GeminiTransport {
    api_base: String,
    http: HttpClient,
    timeout: Option<Duration>,
}

impl Default for GeminiTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiTransport {
    pub fn new() -> Self {
        Self::with_api_base(
            env::var("GEMINI_API_BASE")
                .ok()
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        )
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            http: HttpClient::new(),
            timeout: None,
        }
    }

    /// No timeout is applied unless one is set here.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    pub fn build_payload(request: &GenerationRequest) -> Value {
        let mut parts = vec![json!({ "text": request.text })];
        for file in &request.attachments {
            parts.push(json!({
                "inlineData": {
                    "mimeType": file.mime_type,
                    "data": file.data,
                }
            }));
        }

        json!({
            "systemInstruction": {
                "parts": [{ "text": request.system_instruction }],
            },
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "generationConfig": {
                "responseMimeType": request.response_mime_type,
            },
        })
    }

    /// Joins the text parts of the first candidate, skipping thought parts.
    pub fn extract_text(response_payload: &Value) -> Option<String> {
        let parts = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)?;
        let text = parts
            .iter()
            .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<String>();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl GenerationTransport for GeminiTransport {
    fn generate_content(&self, request: &GenerationRequest) -> Result<String, TransportError> {
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = Self::build_payload(request);
        let mut builder = self
            .http
            .post(&endpoint)
            .query(&[("key", request.api_key.as_str())])
            .json(&payload);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().map_err(|source| TransportError::Request {
            endpoint: endpoint.clone(),
            source,
        })?;
        let response_payload = response_json_or_error(&endpoint, response)?;
        Self::extract_text(&response_payload).ok_or(TransportError::EmptyResponse)
    }
}

fn response_json_or_error(endpoint: &str, response: HttpResponse) -> Result<Value, TransportError> {
    let status = response.status();
    let body = response.text().map_err(|source| TransportError::Request {
        endpoint: endpoint.to_string(),
        source,
    })?;
    if !status.is_success() {
        return Err(TransportError::Http {
            status: status.as_u16(),
            body: truncate_text(&body, 512),
        });
    }
    serde_json::from_str(&body).map_err(TransportError::InvalidPayload)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
