use anyhow::anyhow;
use tokio::net::TcpListener;

use speechgate::{routes, AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // Load configuration
    let config = ServerConfig::from_env()?;
    let address = config.address();
    println!("Starting gateway on {address}");

    // Create application state: spawns the batch dispatcher and connects
    // the shared EPD client.
    let app_state = AppState::new(config).await?;

    let app = routes::api::create_api_router()
        .merge(routes::ws::create_ws_router())
        .with_state(app_state);

    let listener = TcpListener::bind(&address).await?;
    println!("Gateway listening on {address}");

    axum::serve(listener, app).await?;

    Ok(())
}
