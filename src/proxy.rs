//! Inference proxy: `POST /api/ollama`

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{ProxyError, Result};
use crate::events::RelayRequest;
use crate::llm::InferenceService;

/// Shared state for the proxy routes
#[derive(Clone)]
pub struct ProxyState {
    pub inference: Arc<dyn InferenceService>,
}

impl ProxyState {
    pub fn new(inference: Arc<dyn InferenceService>) -> Self {
        Self { inference }
    }
}

/// Build the proxy router
pub fn routes(state: ProxyState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/ollama", post(chat))
        .with_state(state)
}

/// Forward a transcript to the inference service and relay its reply verbatim
pub async fn chat(
    State(state): State<ProxyState>,
    payload: std::result::Result<Json<RelayRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(request) = payload.map_err(|e| ProxyError::MalformedRequest(e.body_text()))?;

    tracing::info!(
        model = %request.model,
        messages = request.messages.len(),
        "Proxying chat request"
    );

    let reply = state.inference.chat(request).await?;
    Ok(Json(reply))
}

async fn health_check() -> &'static str {
    "OK"
}
