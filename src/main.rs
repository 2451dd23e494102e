use std::net::SocketAddr;

use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use agora::config::{Cli, Config};
use agora::routes;
use agora::state::AppState;

const SUPERUSER_PASSWORD_ENV: &str = "AGORA_SUPERUSER_PASSWORD";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;
    let state = AppState::open(config.clone())?;

    if let Some(email) = cli.create_superuser.as_deref() {
        let password = std::env::var(SUPERUSER_PASSWORD_ENV).map_err(|_| {
            anyhow::anyhow!("{} must be set to create a superuser", SUPERUSER_PASSWORD_ENV)
        })?;
        let user = state
            .accounts
            .create_superuser(email, &cli.superuser_name, &password)?;
        tracing::info!("Superuser ready: {} ({})", user.email, user.id);
        return Ok(());
    }

    let app = routes::app(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
