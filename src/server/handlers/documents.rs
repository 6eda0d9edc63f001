use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::rag::IngestOptions;
use crate::state::AppState;

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let docs = state.documents.list_documents().await?;
    Ok(Json(docs))
}

#[derive(Debug, Deserialize)]
pub struct DeleteDocumentRequest {
    pub id: String,
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DeleteDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.id.trim().is_empty() {
        return Err(ApiError::BadRequest("ID ausente".to_string()));
    }

    state.documents.delete_document(payload.id.trim()).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file_name: String,
    pub content: String,
    /// Whole-corpus replace: wipe every document and chunk first.
    #[serde(default)]
    pub replace_all: bool,
}

pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UploadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let opts = IngestOptions::default();
    let report = if payload.replace_all {
        state
            .pipeline
            .ingest_with_corpus_reset(&payload.file_name, &payload.content, &opts)
            .await?
    } else {
        state
            .pipeline
            .ingest_document(&payload.file_name, &payload.content, &opts)
            .await?
    };

    Ok(Json(json!({
        "success": true,
        "documentId": report.document_id,
        "fileName": report.file_name,
        "totalChunks": report.total_chunks,
        "embeddedChunks": report.embedded_chunks,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ReindexRequest {
    pub id: String,
}

pub async fn reindex_document(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ReindexRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .pipeline
        .reindex_document(&payload.id, &IngestOptions::default())
        .await?;

    Ok(Json(json!({
        "success": true,
        "documentId": report.document_id,
        "fileName": report.file_name,
        "totalChunks": report.total_chunks,
        "embeddedChunks": report.embedded_chunks,
    })))
}
