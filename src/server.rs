//! `ullama serve`: runs the inference proxy

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::Config;
use crate::llm::OllamaService;
use crate::proxy::{routes, ProxyState};

/// Build the proxy app with HTTP middleware
pub fn create_app(config: &Config) -> axum::Router {
    let inference = Arc::new(OllamaService::new(&config.ollama.base_url));
    routes(ProxyState::new(inference)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .into_inner(),
    )
}

/// Serve until Ctrl+C or SIGTERM
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address {:?}: {}", config.server.bind, e))?;

    let app = create_app(&config);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Proxy listening on http://{}", listener.local_addr()?);
    info!("Forwarding chat requests to {}/api/chat", config.ollama.base_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
