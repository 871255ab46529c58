//! Proxy error handling
//!
//! Every failure collapses into the same 500 body; the cause only reaches the log.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::llm::InferenceError;

/// Body returned for every proxy failure
pub const GENERIC_ERROR_MESSAGE: &str = "Failed to process the chat request";

/// Proxy result type
pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Ollama API error");

        let body = Json(json!({ "error": GENERIC_ERROR_MESSAGE }));
        (self.status_code(), body).into_response()
    }
}
