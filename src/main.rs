use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use football_live::api::{self, AppState};
use football_live::config::Config;
use football_live::db::Database;
use football_live::live::{Broadcaster, SubscriptionRegistry};
use football_live::matches::MatchService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // Open database
    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    // One registry for the whole process; handlers reach it through the broadcaster
    let registry = Arc::new(SubscriptionRegistry::new(config.channel_capacity));
    let broadcaster = Broadcaster::new(Arc::clone(&registry));
    let matches = MatchService::new(Arc::new(db), broadcaster);

    let app = api::router(AppState {
        matches,
        ping_interval: config.ping_interval(),
    });
    let addr: SocketAddr = config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "⚽ Match server listening on http://{} (ping every {:?})",
        addr,
        config.ping_interval()
    );

    // Open streams never finish on their own, so closing every channel is what
    // lets graceful shutdown complete.
    let shutdown_registry = Arc::clone(&registry);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            let closed = shutdown_registry.close_all();
            info!("Shutting down, closed {} live stream(s)", closed);
        })
        .await?;

    Ok(())
}
