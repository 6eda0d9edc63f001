use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::rag::{QueryRequest, RetrievalMode};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsappRequest {
    pub from: String,
    pub message: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
}

/// Inbound WhatsApp webhook: answer in whole-document mode and forward the
/// reply to the messaging gateway.
pub async fn incoming_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WhatsappRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.from.trim().is_empty() || payload.message.trim().is_empty() {
        return Err(ApiError::BadRequest("'from' ou 'message' ausente".to_string()));
    }

    let mut req = QueryRequest::new(payload.message);
    req.model = payload.model;
    req.system_prompt = payload.system_prompt;
    req.mode = RetrievalMode::Documents;

    let outcome = state.pipeline.answer(req).await?;
    forward_reply(&state, payload.from.trim(), &outcome.reply).await?;

    Ok(Json(json!({ "success": true })))
}

async fn forward_reply(state: &AppState, to: &str, message: &str) -> Result<(), ApiError> {
    let (Some(url), Some(key)) = (
        state.config.evolution_url.as_deref(),
        state.config.evolution_key.as_deref(),
    ) else {
        return Err(ApiError::Internal(
            "EVOLUTION_URL/EVOLUTION_KEY ausente".to_string(),
        ));
    };

    let res = state
        .http
        .post(format!("{}/messages", url.trim_end_matches('/')))
        .bearer_auth(key)
        .json(&json!({ "to": to, "message": message }))
        .send()
        .await
        .map_err(ApiError::internal)?;

    let status = res.status();
    if !status.is_success() {
        return Err(ApiError::Upstream {
            status: status.as_u16(),
            detail: res.text().await.unwrap_or_default(),
        });
    }

    Ok(())
}
