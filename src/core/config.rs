use std::env;
use std::path::PathBuf;

/// Process-level configuration, read once at startup.
///
/// Values here sit in the middle of the credential precedence chain: an
/// explicit per-request override wins over these, and these win over the
/// persisted settings row.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path of the sqlite database file.
    pub database_path: PathBuf,
    /// Process-level OpenRouter API key, if configured.
    pub openrouter_api_key: Option<String>,
    /// Base URL of the OpenRouter-compatible API.
    pub openrouter_base_url: String,
    /// Base URL of the WhatsApp messaging gateway, if configured.
    pub evolution_url: Option<String>,
    /// Bearer token for the messaging gateway.
    pub evolution_key: Option<String>,
    /// HTTP listen port. 0 binds an ephemeral port.
    pub port: u16,
    /// Directory for rolling log files.
    pub log_dir: PathBuf,
}

pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Load configuration from the environment (after `dotenvy` has run).
    pub fn load() -> Self {
        let data_dir = non_empty("ACERVO_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));

        AppConfig {
            database_path: non_empty("ACERVO_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("acervo.db")),
            openrouter_api_key: non_empty("OPEN_ROUTER_API_KEY"),
            openrouter_base_url: non_empty("OPENROUTER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENROUTER_BASE_URL.to_string()),
            evolution_url: non_empty("EVOLUTION_URL"),
            evolution_key: non_empty("EVOLUTION_KEY"),
            port: non_empty("PORT").and_then(|v| v.parse().ok()).unwrap_or(3333),
            log_dir: non_empty("ACERVO_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("logs")),
        }
    }
}
