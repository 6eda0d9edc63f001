pub mod embedder;
pub mod openrouter;
pub mod router;
pub mod types;

pub use embedder::{embed_many, map_with_concurrency, EMBED_CONCURRENCY};
pub use openrouter::{OpenRouterClient, ProviderError};
pub use router::{complete_with_fallback, normalize_model, DEFAULT_MODEL, FALLBACK_MODEL};
pub use types::{ChatMessage, CompletionOutcome};
