use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use acervo_backend::core::config::AppConfig;
use acervo_backend::core::logging;
use acervo_backend::server::router;
use acervo_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = AppConfig::load();
    logging::init(&config.log_dir);

    let state = AppState::initialize(config).await?;

    let bind_addr = format!("127.0.0.1:{}", state.config.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    tracing::info!("Listening on {}", addr);

    let app: Router = router::router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
