//! Store abstractions for the retrieval pipeline.
//!
//! The pipeline never owns storage lifetime: it receives these handles as
//! dependencies and treats every call as synchronous, ordered, at-most-once.
//! The sqlite implementation lives in the `sqlite` module.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

pub use sqlite::SqliteStore;

/// A persisted document: full normalized text plus the whole-document
/// vector used by whole-document similarity mode.
#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub id: String,
    pub file_name: String,
    pub content: String,
    pub created_at: String,
}

/// Listing shape for the documents endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub file_name: String,
    pub created_at: String,
    pub chunk_count: i64,
}

/// A chunk row ready for insertion. `chunk_index` is contiguous and
/// zero-based within its document.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: i64,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// One row of a similarity search, ranked descending by the store. Fields
/// are optional on purpose: the retriever applies defaults when mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRow {
    pub file_name: Option<String>,
    pub content: Option<String>,
    pub similarity: Option<f32>,
}

/// The singleton settings record. The API key is write-only towards
/// clients: handlers expose only a presence flag.
#[derive(Debug, Clone, Default)]
pub struct SettingsRow {
    pub openrouter_api_key: Option<String>,
    pub selected_model: Option<String>,
    pub system_prompt: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SettingsUpdate {
    /// `None` leaves the stored key untouched.
    pub api_key: Option<String>,
    pub selected_model: String,
    pub system_prompt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document and return its identity. The identity must exist
    /// before chunk rows can reference it.
    async fn insert_document(
        &self,
        file_name: &str,
        content: &str,
        embedding: &[f32],
    ) -> Result<String, ApiError>;

    async fn get_document(&self, id: &str) -> Result<Option<DocumentRow>, ApiError>;

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, ApiError>;

    /// Delete one document; its chunks go with it.
    async fn delete_document(&self, id: &str) -> Result<bool, ApiError>;

    async fn delete_all_documents(&self) -> Result<u64, ApiError>;

    async fn insert_chunks(&self, document_id: &str, chunks: Vec<NewChunk>) -> Result<(), ApiError>;

    async fn delete_chunks(&self, document_id: &str) -> Result<u64, ApiError>;

    async fn delete_all_chunks(&self) -> Result<u64, ApiError>;

    /// Chunk-level similarity search, ranked descending by cosine
    /// similarity against `query`.
    async fn match_chunks(&self, query: &[f32], match_count: usize)
        -> Result<Vec<MatchRow>, ApiError>;

    /// Whole-document similarity search over document-level vectors.
    async fn match_documents(
        &self,
        query: &[f32],
        match_count: usize,
    ) -> Result<Vec<MatchRow>, ApiError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> Result<Option<SettingsRow>, ApiError>;

    async fn upsert(&self, update: SettingsUpdate) -> Result<(), ApiError>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(
        &self,
        platform: &str,
        phone_number: Option<&str>,
    ) -> Result<String, ApiError>;

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>, ApiError>;

    async fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> Result<String, ApiError>;
}
