use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::errors::ApiError;
use crate::rag::pipeline::CHUNK_MATCH_COUNT;
use crate::rag::{QueryRequest, RetrievalMode};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub api_key: Option<String>,
    /// Single-document mode: ground the answer in this document only.
    pub document_id: Option<String>,
    pub match_count: Option<usize>,
    /// "chunks" (default) or "documents".
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    pub used_model: String,
    pub fallback_used: bool,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mode = match payload.mode.as_deref() {
        Some("documents") => RetrievalMode::Documents,
        _ => RetrievalMode::Chunks,
    };

    let mut req = QueryRequest::new(payload.message);
    req.model = payload.model;
    req.system_prompt = payload.system_prompt;
    req.api_key = payload.api_key;
    req.document_id = payload.document_id;
    req.match_count = payload.match_count;
    req.mode = mode;

    let outcome = state.pipeline.answer(req).await?;

    Ok(Json(ChatResponse {
        reply: outcome.reply,
        used_model: outcome.used_model,
        fallback_used: outcome.fallback_used,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagDebugRequest {
    pub query: Option<String>,
    pub message: Option<String>,
    pub match_count: Option<usize>,
}

/// Retrieval preview: raw ranked rows, no filtering, no completion call.
pub async fn rag_debug(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RagDebugRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let query = payload
        .query
        .or(payload.message)
        .unwrap_or_default();

    let rows = state
        .pipeline
        .preview(&query, payload.match_count.unwrap_or(CHUNK_MATCH_COUNT))
        .await?;

    Ok(Json(json!({
        "ok": true,
        "count": rows.len(),
        "chunks": rows,
    })))
}
