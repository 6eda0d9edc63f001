use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::config::AppConfig;
use crate::rag::RagPipeline;
use crate::store::{ConversationStore, DocumentStore, SettingsStore, SqliteStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub documents: Arc<dyn DocumentStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub pipeline: Arc<RagPipeline>,
    /// Outbound client for the messaging gateway.
    pub http: reqwest::Client,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub async fn initialize(config: AppConfig) -> anyhow::Result<Arc<Self>> {
        let store = SqliteStore::connect(&config.database_path).await?;

        let documents: Arc<dyn DocumentStore> = Arc::new(store.clone());
        let settings: Arc<dyn SettingsStore> = Arc::new(store.clone());
        let conversations: Arc<dyn ConversationStore> = Arc::new(store);

        let pipeline = Arc::new(RagPipeline::new(
            documents.clone(),
            settings.clone(),
            &config.openrouter_base_url,
            config.openrouter_api_key.clone(),
        ));

        Ok(Arc::new(AppState {
            config: Arc::new(config),
            documents,
            settings,
            conversations,
            pipeline,
            http: reqwest::Client::new(),
            started_at: Utc::now(),
        }))
    }
}
