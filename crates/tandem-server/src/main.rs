use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tandem_db::Database;
use tandem_gateway::Relay;
use tandem_server::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tandem=debug,tandem_server=debug,tandem_gateway=debug,tandem_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let relay = Relay::new(db);

    // Change feeds live for the whole process; cancelled on shutdown
    let cancel = CancellationToken::new();
    let feeds = relay
        .start_change_feeds(config.feed_poll_interval, cancel.clone())
        .await?;

    let app = tandem_server::app(relay, config.cors_origin.as_deref())?;

    let addr = config.addr()?;
    info!("Socket server is running on {}", addr);
    match &config.cors_origin {
        Some(origin) => info!("CORS origin: {}", origin),
        None => warn!("CORS_ORIGIN unset, allowing any origin"),
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    for feed in feeds {
        if let Err(e) = feed.await {
            warn!("Change listener ended abnormally: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
