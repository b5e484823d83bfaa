//! Pool walkthrough against a live Chromium.
//!
//! Start a browser with an open DevTools port first:
//!   chromium --headless --remote-debugging-port=9222
//! Then: cargo run --example pool_demo

use std::sync::Arc;
use std::time::Duration;

use relay_core::{BrowserPool, CdpLauncher, PoolConfig, SessionOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let launcher = Arc::new(CdpLauncher::new("ws://localhost:9222/devtools/browser"));
    let pool = BrowserPool::new(launcher, PoolConfig::default());

    let id = pool.create_session(SessionOptions::default()).await?;
    println!("session: {id}");

    let session = pool
        .get_session(&id)
        .await
        .ok_or("session vanished")?;

    let final_url = session
        .navigate("https://example.com", Duration::from_secs(30))
        .await?;
    println!("landed on: {final_url}");

    let requests = session.network_requests(None)?;
    println!("captured {} completed requests", requests.len());
    for request in &requests {
        let status = request.response.as_ref().map(|r| r.status).unwrap_or(0);
        println!("  {} {} -> {}", request.method, request.url, status);
    }

    pool.close_all().await;
    Ok(())
}
