//! Upstream inference service
//!
//! The proxy talks to the model runtime through [`InferenceService`]. The
//! production implementation calls Ollama's chat API
//! (`POST {base_url}/api/chat`) with a single non-streamed request.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::events::RelayRequest;

/// Errors raised while talking to the inference service
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Request to inference service failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Inference service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Inference service returned an unreadable body: {0}")]
    Decode(String),
}

/// A chat completion backend
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Run one chat completion and return the service's JSON reply untouched
    async fn chat(&self, request: RelayRequest) -> Result<Value, InferenceError>;
}

/// Ollama `/api/chat` request body
#[derive(Debug, Serialize)]
struct OllamaChatBody<'a> {
    model: &'a str,
    messages: &'a [Value],
    stream: bool,
}

/// Ollama-backed inference service
#[derive(Clone)]
pub struct OllamaService {
    client: Client,
    base_url: String,
}

impl OllamaService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl InferenceService for OllamaService {
    async fn chat(&self, request: RelayRequest) -> Result<Value, InferenceError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = OllamaChatBody {
            model: &request.model,
            messages: &request.messages,
            stream: false,
        };

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending Ollama chat request"
        );

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| InferenceError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let service = OllamaService::new("http://localhost:11434/");
        assert_eq!(service.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_chat_body_forwards_model_and_messages() {
        let messages = vec![serde_json::json!({ "role": "user", "content": "hello" })];
        let body = OllamaChatBody {
            model: "phi3",
            messages: &messages,
            stream: false,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "model": "phi3",
                "messages": [{ "role": "user", "content": "hello" }],
                "stream": false
            })
        );
    }

    #[test]
    fn test_status_error_message() {
        let err = InferenceError::Status {
            status: 404,
            body: "model 'nope' not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Inference service returned 404: model 'nope' not found"
        );
    }
}
