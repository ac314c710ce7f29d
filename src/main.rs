use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use ollama_relay::config::{Cli, Config};
use ollama_relay::server::api::{build_router, AppState};
use ollama_relay::upstream::UpstreamClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "ollama_relay=debug,tower_http=debug"
    } else {
        "ollama_relay=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("ollama-relay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    let config = Arc::new(config);

    let upstream = UpstreamClient::new(&config.upstream)?;

    info!(
        upstream = upstream.url(),
        default_model = upstream.default_model(),
        max_retries = config.upstream.max_retries,
        retry_delay_ms = config.upstream.retry_delay_ms,
        "Configuration loaded"
    );

    let state = Arc::new(AppState {
        upstream,
        config: config.clone(),
    });

    let app = build_router(state);

    let listen_addr = config.server.listen.clone();
    info!(addr = listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
