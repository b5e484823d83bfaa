use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use relay_core::{BrowserPool, CdpLauncher};
use relay_http::{router, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    let launcher = Arc::new(CdpLauncher::new(config.cdp_url.clone()));
    let pool = Arc::new(BrowserPool::new(launcher, config.pool_config()));

    let app = router(Arc::clone(&pool));
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(%address, max_sessions = config.max_sessions, "browser relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain the pool so every browser context is released before exit.
    pool.close_all().await;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!("shutdown signal unavailable: {err}"),
    }
}
