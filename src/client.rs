//! HTTP client for the inference proxy

use reqwest::Client;
use serde::Deserialize;

use crate::events::{ChatMessage, ChatRequest};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to reach the proxy: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to get response ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("Reply had no message content: {0}")]
    Decode(String),
}

/// The only part of the upstream reply the UI consumes
#[derive(Debug, Deserialize)]
struct ReplyBody {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: String,
}

/// Calls `POST /api/ollama` on the proxy
#[derive(Clone)]
pub struct ProxyClient {
    client: Client,
    endpoint: String,
}

impl ProxyClient {
    pub fn new(proxy_url: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/api/ollama", proxy_url.trim_end_matches('/')),
        }
    }

    /// Send a transcript and return the assistant's reply content
    pub async fn chat(&self, messages: Vec<ChatMessage>, model: String) -> Result<String, ClientError> {
        let request = ChatRequest { messages, model };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let reply: ReplyBody =
            serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(reply.message.content)
    }
}
