//! SQLite-backed stores.
//!
//! Single-file database holding documents, chunks, the settings singleton
//! and chat transcripts. Embeddings are stored as little-endian f32 blobs;
//! similarity search is brute-force cosine in process, ranked descending,
//! which stands in for the vector-store RPC of the hosted deployment.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{
    ConversationStore, DocumentRow, DocumentStore, DocumentSummary, MatchRow, MessageRow, NewChunk,
    SettingsRow, SettingsStore, SettingsUpdate,
};
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(db_path: &Path) -> Result<Self, ApiError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(ApiError::store)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::store)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS document_chunks (
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (document_id, chunk_index)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                openrouter_api_key TEXT,
                selected_model TEXT,
                system_prompt TEXT,
                updated_at TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                platform TEXT NOT NULL DEFAULT 'web',
                phone_number TEXT,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn rank_rows(mut scored: Vec<(f32, MatchRow)>, match_count: usize) -> Vec<MatchRow> {
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(match_count.max(1));
        scored.into_iter().map(|(_, row)| row).collect()
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert_document(
        &self,
        file_name: &str,
        content: &str,
        embedding: &[f32],
    ) -> Result<String, ApiError> {
        let id = Uuid::new_v4().to_string();
        let blob = Self::serialize_embedding(embedding);

        sqlx::query(
            "INSERT INTO documents (id, file_name, content, embedding) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&id)
        .bind(file_name)
        .bind(content)
        .bind(&blob)
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        Ok(id)
    }

    async fn get_document(&self, id: &str) -> Result<Option<DocumentRow>, ApiError> {
        let row = sqlx::query(
            "SELECT id, file_name, content, created_at FROM documents WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::store)?;

        Ok(row.map(|row| DocumentRow {
            id: row.get("id"),
            file_name: row.get("file_name"),
            content: row.get("content"),
            created_at: row.get("created_at"),
        }))
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, ApiError> {
        let rows = sqlx::query(
            "SELECT d.id, d.file_name, d.created_at,
                    (SELECT COUNT(*) FROM document_chunks c WHERE c.document_id = d.id) AS chunk_count
             FROM documents d
             ORDER BY d.created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::store)?;

        Ok(rows
            .iter()
            .map(|row| DocumentSummary {
                id: row.get("id"),
                file_name: row.get("file_name"),
                created_at: row.get("created_at"),
                chunk_count: row.get("chunk_count"),
            })
            .collect())
    }

    async fn delete_document(&self, id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_documents(&self) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM documents")
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;

        Ok(result.rows_affected())
    }

    async fn insert_chunks(&self, document_id: &str, chunks: Vec<NewChunk>) -> Result<(), ApiError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::store)?;

        for chunk in &chunks {
            let blob = Self::serialize_embedding(&chunk.embedding);
            sqlx::query(
                "INSERT INTO document_chunks (document_id, chunk_index, content, embedding)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::store)?;
        }

        tx.commit().await.map_err(ApiError::store)?;
        Ok(())
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM document_chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;

        Ok(result.rows_affected())
    }

    async fn delete_all_chunks(&self) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM document_chunks")
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;

        Ok(result.rows_affected())
    }

    async fn match_chunks(
        &self,
        query: &[f32],
        match_count: usize,
    ) -> Result<Vec<MatchRow>, ApiError> {
        let rows = sqlx::query(
            "SELECT c.content, c.embedding, d.file_name
             FROM document_chunks c
             LEFT JOIN documents d ON d.id = c.document_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::store)?;

        let scored = rows
            .iter()
            .map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                let stored = Self::deserialize_embedding(&embedding_bytes);
                let similarity = Self::cosine_similarity(query, &stored);
                (
                    similarity,
                    MatchRow {
                        file_name: row.get("file_name"),
                        content: row.get("content"),
                        similarity: Some(similarity),
                    },
                )
            })
            .collect();

        Ok(Self::rank_rows(scored, match_count))
    }

    async fn match_documents(
        &self,
        query: &[f32],
        match_count: usize,
    ) -> Result<Vec<MatchRow>, ApiError> {
        let rows = sqlx::query("SELECT file_name, content, embedding FROM documents")
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::store)?;

        let scored = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Option<Vec<u8>> = row.get("embedding");
                let stored = Self::deserialize_embedding(&embedding_bytes?);
                if stored.is_empty() {
                    return None;
                }
                let similarity = Self::cosine_similarity(query, &stored);
                Some((
                    similarity,
                    MatchRow {
                        file_name: row.get("file_name"),
                        content: row.get("content"),
                        similarity: Some(similarity),
                    },
                ))
            })
            .collect();

        Ok(Self::rank_rows(scored, match_count))
    }
}

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn load(&self) -> Result<Option<SettingsRow>, ApiError> {
        let row = sqlx::query(
            "SELECT openrouter_api_key, selected_model, system_prompt, updated_at
             FROM settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::store)?;

        Ok(row.map(|row| SettingsRow {
            openrouter_api_key: row.get("openrouter_api_key"),
            selected_model: row.get("selected_model"),
            system_prompt: row.get("system_prompt"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn upsert(&self, update: SettingsUpdate) -> Result<(), ApiError> {
        let now = Utc::now().to_rfc3339();

        // COALESCE keeps the stored key when no new key is supplied.
        sqlx::query(
            "INSERT INTO settings (id, openrouter_api_key, selected_model, system_prompt, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                openrouter_api_key = COALESCE(?1, settings.openrouter_api_key),
                selected_model = ?2,
                system_prompt = ?3,
                updated_at = ?4",
        )
        .bind(&update.api_key)
        .bind(&update.selected_model)
        .bind(&update.system_prompt)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn create_conversation(
        &self,
        platform: &str,
        phone_number: Option<&str>,
    ) -> Result<String, ApiError> {
        let id = Uuid::new_v4().to_string();

        sqlx::query("INSERT INTO conversations (id, platform, phone_number) VALUES (?1, ?2, ?3)")
            .bind(&id)
            .bind(platform)
            .bind(phone_number)
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;

        Ok(id)
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, role, content, created_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::store)?;

        Ok(rows
            .iter()
            .map(|row| MessageRow {
                id: row.get("id"),
                conversation_id: row.get("conversation_id"),
                role: row.get("role"),
                content: row.get("content"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> Result<String, ApiError> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(role)
        .bind(content)
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        let path = std::env::temp_dir().join(format!("acervo-test-{}.db", Uuid::new_v4()));
        SqliteStore::connect(&path).await.unwrap()
    }

    fn chunk(index: i64, content: &str, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            chunk_index: index,
            content: content.to_string(),
            embedding,
        }
    }

    #[tokio::test]
    async fn insert_document_then_chunks_and_count() {
        let store = test_store().await;

        let id = store
            .insert_document("manual.pdf", "conteúdo completo", &[1.0, 0.0])
            .await
            .unwrap();

        store
            .insert_chunks(
                &id,
                vec![
                    chunk(0, "primeira parte", vec![1.0, 0.0]),
                    chunk(1, "segunda parte", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let docs = store.list_documents().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].file_name, "manual.pdf");
        assert_eq!(docs[0].chunk_count, 2);
    }

    #[tokio::test]
    async fn match_chunks_ranks_by_similarity_descending() {
        let store = test_store().await;

        let id = store
            .insert_document("doc.txt", "texto", &[1.0, 0.0])
            .await
            .unwrap();
        store
            .insert_chunks(
                &id,
                vec![
                    chunk(0, "ortogonal", vec![0.0, 1.0]),
                    chunk(1, "alinhado", vec![1.0, 0.0]),
                    chunk(2, "diagonal", vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let rows = store.match_chunks(&[1.0, 0.0], 8).await.unwrap();
        let contents: Vec<&str> = rows.iter().filter_map(|r| r.content.as_deref()).collect();
        assert_eq!(contents, vec!["alinhado", "diagonal", "ortogonal"]);
        assert!(rows[0].similarity.unwrap() > rows[1].similarity.unwrap());
        assert_eq!(rows[0].file_name.as_deref(), Some("doc.txt"));
    }

    #[tokio::test]
    async fn match_documents_uses_document_vectors() {
        let store = test_store().await;

        store
            .insert_document("a.txt", "texto a", &[1.0, 0.0])
            .await
            .unwrap();
        store
            .insert_document("b.txt", "texto b", &[0.0, 1.0])
            .await
            .unwrap();

        let rows = store.match_documents(&[0.0, 1.0], 3).await.unwrap();
        assert_eq!(rows[0].file_name.as_deref(), Some("b.txt"));
        assert_eq!(rows[0].content.as_deref(), Some("texto b"));
    }

    #[tokio::test]
    async fn delete_document_cascades_to_chunks() {
        let store = test_store().await;

        let id = store
            .insert_document("doc.txt", "texto", &[1.0])
            .await
            .unwrap();
        store
            .insert_chunks(&id, vec![chunk(0, "parte", vec![1.0])])
            .await
            .unwrap();

        assert!(store.delete_document(&id).await.unwrap());

        let rows = store.match_chunks(&[1.0], 8).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn delete_all_wipes_both_tables() {
        let store = test_store().await;

        let id = store
            .insert_document("doc.txt", "texto", &[1.0])
            .await
            .unwrap();
        store
            .insert_chunks(&id, vec![chunk(0, "parte", vec![1.0])])
            .await
            .unwrap();

        assert_eq!(store.delete_all_chunks().await.unwrap(), 1);
        assert_eq!(store.delete_all_documents().await.unwrap(), 1);
        assert!(store.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn settings_upsert_preserves_key_when_absent() {
        let store = test_store().await;

        store
            .upsert(SettingsUpdate {
                api_key: Some("sk-segredo".to_string()),
                selected_model: "gpt-4".to_string(),
                system_prompt: "Você é um assistente útil.".to_string(),
            })
            .await
            .unwrap();

        store
            .upsert(SettingsUpdate {
                api_key: None,
                selected_model: "claude".to_string(),
                system_prompt: "Outro prompt.".to_string(),
            })
            .await
            .unwrap();

        let row = SettingsStore::load(&store).await.unwrap().unwrap();
        assert_eq!(row.openrouter_api_key.as_deref(), Some("sk-segredo"));
        assert_eq!(row.selected_model.as_deref(), Some("claude"));
        assert_eq!(row.system_prompt.as_deref(), Some("Outro prompt."));
        assert!(row.updated_at.is_some());
    }

    #[tokio::test]
    async fn conversation_transcript_is_append_only_and_ordered() {
        let store = test_store().await;

        let conv = store
            .create_conversation("web", None)
            .await
            .unwrap();
        store.append_message(&conv, "user", "oi").await.unwrap();
        store
            .append_message(&conv, "assistant", "olá!")
            .await
            .unwrap();

        let messages = store.list_messages(&conv).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
    }
}
