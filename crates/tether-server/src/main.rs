use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use tether_server::{Server, ServerConfig, ServerEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether=debug,tether_server=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    info!(
        "Storage directory: {} (framing: {:?})",
        config.storage_dir.display(),
        config.framing
    );

    let port = config.port;
    let server = Server::new(config);

    // Console output for every server event
    let mut events = server.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    println!("{}", event);
                    if matches!(event, ServerEvent::ServerStopped { .. }) {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("Event printer skipped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    server.start(port).await?;

    shutdown_signal().await;
    server.stop().await;

    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
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
