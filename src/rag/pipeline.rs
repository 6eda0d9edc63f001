//! Pipeline coordinator: composes chunking, embedding, retrieval and the
//! model router into the two entry flows.
//!
//! Ingest: normalize → chunk → embed (document vector + bounded chunk
//! fan-out) → persist document then chunks. Query: embed question →
//! similarity search → context assembly → completion with the single
//! payment-required fallback.
//!
//! The coordinator holds store handles, never storage lifetime. Multi-step
//! writes are not transactional: a failure after the document insert leaves
//! a document without chunks, and concurrent reindexes of the same document
//! are not serialized here.

use std::sync::Arc;

use tracing::{info, warn};

use crate::core::errors::ApiError;
use crate::llm::{
    complete_with_fallback, embed_many, normalize_model, ChatMessage, CompletionOutcome,
    OpenRouterClient, EMBED_CONCURRENCY, FALLBACK_MODEL,
};
use crate::rag::chunker::{self, ChunkOptions};
use crate::rag::retriever::{self, MAX_CITED_SOURCES, SIMILARITY_MIN};
use crate::store::{DocumentStore, MatchRow, NewChunk, SettingsRow, SettingsStore};

pub const DEFAULT_SYSTEM_PROMPT: &str = "Você é um assistente útil.";
/// Upper bound on embedded chunks per document.
pub const MAX_CHUNKS_PER_DOCUMENT: usize = 20;
pub const CHUNK_MATCH_COUNT: usize = 8;
pub const DOCUMENT_MATCH_COUNT: usize = 3;
const MIN_REINDEX_CONTENT_CHARS: usize = 10;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub chunk: ChunkOptions,
    /// Chunks beyond this bound are dropped (and reported via the
    /// total/embedded counts in the report).
    pub max_chunks: usize,
    pub concurrency: usize,
    /// When false, the prepended overlap is excluded from each chunk's
    /// embedding input; stored content keeps the overlap either way.
    pub embed_overlap: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            chunk: ChunkOptions::default(),
            max_chunks: MAX_CHUNKS_PER_DOCUMENT,
            concurrency: EMBED_CONCURRENCY,
            embed_overlap: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub document_id: String,
    pub file_name: String,
    pub total_chunks: usize,
    pub embedded_chunks: usize,
}

/// Which similarity search grounds the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    /// Chunk-level retrieval with relevance filtering (default).
    Chunks,
    /// Whole-document similarity over document-level vectors.
    Documents,
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub message: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub api_key: Option<String>,
    /// Single-document mode: skip retrieval, use this document's full
    /// content as the sole context.
    pub document_id: Option<String>,
    pub match_count: Option<usize>,
    pub mode: RetrievalMode,
}

impl QueryRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            model: None,
            system_prompt: None,
            api_key: None,
            document_id: None,
            match_count: None,
            mode: RetrievalMode::Chunks,
        }
    }
}

pub struct RagPipeline {
    documents: Arc<dyn DocumentStore>,
    settings: Arc<dyn SettingsStore>,
    base_url: String,
    env_api_key: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Bounded-embed chunk pieces and pair each stored content with its vector,
/// indexes contiguous from zero.
async fn embed_pieces(
    client: &OpenRouterClient,
    pieces: Vec<chunker::ChunkPiece>,
    opts: &IngestOptions,
) -> Result<Vec<NewChunk>, ApiError> {
    let inputs: Vec<String> = pieces
        .iter()
        .map(|piece| {
            if opts.embed_overlap {
                piece.content.clone()
            } else {
                piece.body.clone()
            }
        })
        .collect();
    let vectors = embed_many(client, inputs, opts.concurrency).await?;

    Ok(pieces
        .into_iter()
        .zip(vectors)
        .enumerate()
        .map(|(index, (piece, embedding))| NewChunk {
            chunk_index: index as i64,
            content: piece.content,
            embedding,
        })
        .collect())
}

impl RagPipeline {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        settings: Arc<dyn SettingsStore>,
        base_url: &str,
        env_api_key: Option<String>,
    ) -> Self {
        Self {
            documents,
            settings,
            base_url: base_url.trim_end_matches('/').to_string(),
            env_api_key,
        }
    }

    fn client(&self, api_key: &str) -> OpenRouterClient {
        OpenRouterClient::new(&self.base_url, api_key)
    }

    /// Credential precedence: per-request override, then process env, then
    /// the persisted settings row. First non-empty wins.
    fn resolve_api_key(
        &self,
        override_key: Option<&str>,
        settings: &SettingsRow,
    ) -> Result<String, ApiError> {
        non_empty(override_key)
            .or(non_empty(self.env_api_key.as_deref()))
            .or(non_empty(settings.openrouter_api_key.as_deref()))
            .map(str::to_string)
            .ok_or_else(|| {
                ApiError::Unauthorized("OPEN_ROUTER_API_KEY ausente (settings/ENV)".to_string())
            })
    }

    /// Ingest a new document: embed the full text for the document-level
    /// vector, insert the document row, then bounded-embed and insert its
    /// chunks. The document insert must succeed (and yield an identity)
    /// before any chunk row is written.
    pub async fn ingest_document(
        &self,
        file_name: &str,
        content: &str,
        opts: &IngestOptions,
    ) -> Result<IngestReport, ApiError> {
        let file_name = file_name.trim();
        let clean = chunker::normalize_text(content);
        if file_name.is_empty() || clean.is_empty() {
            return Err(ApiError::BadRequest("Conteúdo ou nome ausente".to_string()));
        }

        let pieces = chunker::chunk_pieces(&clean, &opts.chunk);
        self.ingest_prepared(file_name, clean, pieces, opts).await
    }

    /// Ingest pre-split chunks directly, bypassing the chunker. The stored
    /// document content is the blank-line concatenation of the chunks.
    pub async fn ingest_presplit(
        &self,
        file_name: &str,
        chunks: Vec<String>,
        opts: &IngestOptions,
    ) -> Result<IngestReport, ApiError> {
        let file_name = file_name.trim();
        let chunks: Vec<String> = chunks
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if file_name.is_empty() || chunks.is_empty() {
            return Err(ApiError::BadRequest("Conteúdo ou nome ausente".to_string()));
        }

        let content = chunks.join("\n\n");
        let pieces = chunks
            .into_iter()
            .map(|body| chunker::ChunkPiece {
                content: body.clone(),
                body,
            })
            .collect();
        self.ingest_prepared(file_name, content, pieces, opts).await
    }

    async fn ingest_prepared(
        &self,
        file_name: &str,
        content: String,
        pieces: Vec<chunker::ChunkPiece>,
        opts: &IngestOptions,
    ) -> Result<IngestReport, ApiError> {
        let settings = self.settings.load().await?.unwrap_or_default();
        let api_key = self.resolve_api_key(None, &settings)?;
        let client = self.client(&api_key);

        let total_chunks = pieces.len();
        let limited: Vec<chunker::ChunkPiece> =
            pieces.into_iter().take(opts.max_chunks).collect();
        if total_chunks > limited.len() {
            warn!(
                "document {} produced {} chunks, embedding only the first {}",
                file_name,
                total_chunks,
                limited.len()
            );
        }

        let document_embedding = client.embed(&content).await?;
        let document_id = self
            .documents
            .insert_document(file_name, &content, &document_embedding)
            .await?;

        let rows = embed_pieces(&client, limited, opts).await?;
        let embedded_chunks = rows.len();
        self.documents.insert_chunks(&document_id, rows).await?;

        info!(
            "ingested {} ({} of {} chunks embedded)",
            file_name, embedded_chunks, total_chunks
        );

        Ok(IngestReport {
            document_id,
            file_name: file_name.to_string(),
            total_chunks,
            embedded_chunks,
        })
    }

    /// Re-chunk and re-embed an existing document. Replace semantics: all
    /// prior chunks are deleted, then a fresh contiguous set is inserted.
    /// The document-level vector is left untouched.
    pub async fn reindex_document(
        &self,
        id: &str,
        opts: &IngestOptions,
    ) -> Result<IngestReport, ApiError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ApiError::BadRequest("ID ausente".to_string()));
        }

        let settings = self.settings.load().await?.unwrap_or_default();
        let api_key = self.resolve_api_key(None, &settings)?;

        let doc = self
            .documents
            .get_document(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Documento não encontrado".to_string()))?;

        let content = doc.content.trim().to_string();
        if content.chars().count() < MIN_REINDEX_CONTENT_CHARS {
            return Err(ApiError::BadRequest(
                "Documento sem conteúdo suficiente para reindexar".to_string(),
            ));
        }

        self.documents.delete_chunks(id).await?;

        let client = self.client(&api_key);
        let pieces = chunker::chunk_pieces(&content, &opts.chunk);
        let total_chunks = pieces.len();
        let limited: Vec<chunker::ChunkPiece> =
            pieces.into_iter().take(opts.max_chunks).collect();

        let rows = embed_pieces(&client, limited, opts).await?;
        let embedded_chunks = rows.len();
        self.documents.insert_chunks(id, rows).await?;

        info!(
            "reindexed {} ({} of {} chunks embedded)",
            doc.file_name, embedded_chunks, total_chunks
        );

        Ok(IngestReport {
            document_id: id.to_string(),
            file_name: doc.file_name,
            total_chunks,
            embedded_chunks,
        })
    }

    /// Whole-corpus replace: both destructive deletes must succeed before
    /// any insert. A failure between them leaves the corpus empty rather
    /// than mixed.
    pub async fn ingest_with_corpus_reset(
        &self,
        file_name: &str,
        content: &str,
        opts: &IngestOptions,
    ) -> Result<IngestReport, ApiError> {
        self.documents.delete_all_chunks().await?;
        self.documents.delete_all_documents().await?;
        self.ingest_document(file_name, content, opts).await
    }

    /// Answer a question grounded in retrieved context.
    pub async fn answer(&self, req: QueryRequest) -> Result<CompletionOutcome, ApiError> {
        let message = req.message.trim().to_string();
        if message.is_empty() {
            return Err(ApiError::BadRequest("message ausente".to_string()));
        }

        let settings = self.settings.load().await?.unwrap_or_default();
        let api_key = self.resolve_api_key(req.api_key.as_deref(), &settings)?;

        let model = normalize_model(
            non_empty(req.model.as_deref())
                .or(non_empty(settings.selected_model.as_deref()))
                .unwrap_or(""),
        );
        let system_prompt = non_empty(req.system_prompt.as_deref())
            .or(non_empty(settings.system_prompt.as_deref()))
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
            .to_string();

        let client = self.client(&api_key);

        let context = if let Some(document_id) = non_empty(req.document_id.as_deref()) {
            let doc = self
                .documents
                .get_document(document_id)
                .await?
                .ok_or_else(|| ApiError::NotFound("Documento não encontrado".to_string()))?;
            retriever::single_document_context(&doc.file_name, &doc.content)
        } else {
            let query_embedding = client.embed(&message).await?;
            let rows = match req.mode {
                RetrievalMode::Chunks => {
                    self.documents
                        .match_chunks(&query_embedding, req.match_count.unwrap_or(CHUNK_MATCH_COUNT))
                        .await?
                }
                RetrievalMode::Documents => {
                    self.documents
                        .match_documents(
                            &query_embedding,
                            req.match_count.unwrap_or(DOCUMENT_MATCH_COUNT),
                        )
                        .await?
                }
            };
            retriever::build_context(&rows, SIMILARITY_MIN, MAX_CITED_SOURCES)
        };

        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::system(retriever::forced_context(&context.block)),
            ChatMessage::user(message.as_str()),
        ];

        let outcome = complete_with_fallback(&client, &model, FALLBACK_MODEL, &messages).await?;

        Ok(CompletionOutcome {
            reply: format!(
                "{}{}",
                outcome.reply,
                retriever::sources_footer(&context.sources)
            ),
            used_model: outcome.used_model,
            fallback_used: outcome.fallback_used,
        })
    }

    /// Retrieval preview: embed the query and return the raw ranked rows,
    /// unfiltered.
    pub async fn preview(
        &self,
        query: &str,
        match_count: usize,
    ) -> Result<Vec<MatchRow>, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ApiError::BadRequest("query ausente".to_string()));
        }

        let settings = self.settings.load().await?.unwrap_or_default();
        let api_key = self.resolve_api_key(None, &settings)?;
        let client = self.client(&api_key);

        let embedding = client.embed(query).await?;
        self.documents.match_chunks(&embedding, match_count).await
    }
}
