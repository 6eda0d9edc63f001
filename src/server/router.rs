use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, conversations, documents, health, settings, whatsapp};
use crate::state::AppState;

/// Application router: health check, chat + retrieval debug, document CRUD
/// and ingestion, settings, transcripts and the WhatsApp webhook.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/api/chat", post(chat::chat))
        .route("/api/rag/debug", post(chat::rag_debug))
        .route(
            "/api/documents",
            get(documents::list_documents).delete(documents::delete_document),
        )
        .route("/api/upload", post(documents::upload_document))
        .route("/api/reindex", post(documents::reindex_document))
        .route(
            "/api/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .route(
            "/api/conversations",
            post(conversations::create_conversation),
        )
        .route(
            "/api/messages",
            get(conversations::list_messages).post(conversations::append_message),
        )
        .route("/api/whatsapp", post(whatsapp::incoming_message))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}
