use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::llm::DEFAULT_MODEL;
use crate::rag::DEFAULT_SYSTEM_PROMPT;
use crate::state::AppState;
use crate::store::{SettingsRow, SettingsUpdate};

/// The API key is write-only: clients only ever see a presence flag.
fn settings_view(row: Option<SettingsRow>) -> Value {
    let row = row.unwrap_or_default();
    let has_api_key = row
        .openrouter_api_key
        .as_deref()
        .map(|k| !k.is_empty())
        .unwrap_or(false);

    json!({
        "selectedModel": row.selected_model.filter(|m| !m.is_empty()).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        "systemPrompt": row.system_prompt.filter(|p| !p.is_empty()).unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        "hasApiKey": has_api_key,
        "updatedAt": row.updated_at,
    })
}

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state.settings.load().await?;
    Ok(Json(settings_view(row)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub api_key: Option<String>,
    pub selected_model: String,
    pub system_prompt: String,
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdateSettingsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // A blank key leaves the stored one untouched.
    let api_key = payload
        .api_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());

    state
        .settings
        .upsert(SettingsUpdate {
            api_key,
            selected_model: payload.selected_model,
            system_prompt: payload.system_prompt,
        })
        .await?;

    Ok(Json(json!({ "success": true })))
}
