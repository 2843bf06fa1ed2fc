//! Web server for Storehouse.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;

use crate::config::{Config, WebConfig};
use crate::Result;

use super::handlers::AppState;
use super::router::create_router;

/// How often idle upload quotas are swept.
const QUOTA_CLEANUP_INTERVAL_SECS: u64 = 300;

/// Web server for the API.
pub struct WebServer {
    /// Host to bind.
    host: String,
    /// Port to bind.
    port: u16,
    /// Application state.
    app_state: Arc<AppState>,
    /// Web configuration.
    web_config: WebConfig,
}

impl WebServer {
    /// Create a new web server. The storage root is created if missing.
    pub fn new(config: &Config) -> Result<Self> {
        let app_state = AppState::from_config(config)?;

        Ok(Self {
            host: config.server.host.clone(),
            port: config.server.port,
            app_state: Arc::new(app_state),
            web_config: config.web.clone(),
        })
    }

    /// Shared application state.
    pub fn app_state(&self) -> &Arc<AppState> {
        &self.app_state
    }

    fn router(&self) -> Router {
        create_router(self.app_state.clone(), &self.web_config.cors_origins)
            .layer(CompressionLayer::new())
    }

    async fn bind(&self) -> std::io::Result<TcpListener> {
        let listener = TcpListener::bind((self.host.as_str(), self.port)).await?;

        // Start quota cleanup only after a successful bind
        self.app_state
            .limiter
            .clone()
            .start_cleanup_task(Duration::from_secs(QUOTA_CLEANUP_INTERVAL_SECS));
        tracing::info!(
            interval_secs = QUOTA_CLEANUP_INTERVAL_SECS,
            "Upload quota cleanup task started"
        );

        Ok(listener)
    }

    /// Run the web server until Ctrl+C.
    pub async fn run(self) -> std::io::Result<()> {
        let router = self.router();
        let listener = self.bind().await?;
        tracing::info!("Web server listening on http://{}", listener.local_addr()?);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("Web server stopped");
        Ok(())
    }

    /// Run the server in the background and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> std::io::Result<SocketAddr> {
        let router = self.router();
        let listener = self.bind().await?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
