//! # ChatConduit Server
//!
//! Binary entry point: parse configuration, build application state, serve.

use chat_conduit::{create_router, AppState, Config};
use std::net::SocketAddr;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from CLI args and .env file
    let config = Config::parse_args();
    let port = config.port;

    // Log the backend endpoint safely (scheme and host only)
    let safe_url = match url::Url::parse(&config.backend_url) {
        Ok(url) => format!("{}://{}", url.scheme(), url.host_str().unwrap_or("unknown")),
        Err(_) => "invalid-url".to_string(),
    };

    let state = AppState::new(config.clone())?;
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("ChatConduit gateway starting on http://{}", addr);
    info!("Provider: {} ({} auth)", config.provider_name, config.auth_scheme);
    info!("Backend: {}", safe_url);
    info!("Default model: {}", config.model_id);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
