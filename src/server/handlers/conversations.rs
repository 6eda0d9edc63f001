use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

const VALID_ROLES: &[&str] = &["user", "assistant", "system"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub platform: Option<String>,
    pub phone_number: Option<String>,
}

pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let platform = payload.platform.as_deref().unwrap_or("web");
    let id = state
        .conversations
        .create_conversation(platform, payload.phone_number.as_deref())
        .await?;

    Ok(Json(json!({ "id": id })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    pub conversation_id: Option<String>,
}

pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessagesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation_id = query
        .conversation_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("conversationId ausente".to_string()))?;

    let messages = state.conversations.list_messages(conversation_id).await?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendMessageRequest {
    pub conversation_id: String,
    pub role: String,
    pub content: String,
}

pub async fn append_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AppendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.conversation_id.trim().is_empty() {
        return Err(ApiError::BadRequest("conversationId ausente".to_string()));
    }
    if !VALID_ROLES.contains(&payload.role.as_str()) {
        return Err(ApiError::BadRequest("role inválido".to_string()));
    }
    if payload.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content ausente".to_string()));
    }

    let id = state
        .conversations
        .append_message(
            payload.conversation_id.trim(),
            &payload.role,
            &payload.content,
        )
        .await?;

    Ok(Json(json!({ "id": id })))
}
