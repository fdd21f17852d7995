//! Web server module for the Bridge control plane
mod api;
mod middleware;

use actix_web::{
    dev::{Server, ServerHandle},
    middleware::{Compress, Logger, NormalizePath},
    web::{self, Data},
    App, HttpServer,
};
use async_trait::async_trait;
use bridge_error::{init::InitContextError, BridgeError, BridgeResult};
use bridge_models::{settings::Settings, ControlPlane, WebServer};
use middleware::cors;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    control_plane: Arc<dyn ControlPlane>,
}

impl AppState {
    pub fn control_plane(&self) -> &Arc<dyn ControlPlane> {
        &self.control_plane
    }
}

/// BridgeWebServer handles the web server initialization and management
#[derive(Clone)]
pub struct BridgeWebServer {
    /// Server handle for graceful shutdown
    server: Arc<Mutex<Option<ServerHandle>>>,
}

impl BridgeWebServer {
    /// Create and configure the HTTP server
    async fn create_server(
        settings: &Settings,
        control_plane: Arc<dyn ControlPlane>,
    ) -> BridgeResult<Server> {
        let addr = format!("{}:{}", settings.web.host, settings.web.port);
        let router_prefix = settings.web.router_prefix.clone();
        let worker_count = settings.web.get_worker_count();
        let cors_config = settings.web.cors.clone();

        let state = AppState { control_plane };

        let mut server = HttpServer::new(move || {
            App::new()
                .app_data(Data::new(Arc::new(state.clone())))
                .wrap(cors::middleware(&cors_config))
                .wrap(Logger::default())
                .wrap(Compress::default())
                .wrap(NormalizePath::trim())
                // Public root routes (health, metrics) outside the prefix.
                .configure(api::configure_public_routes)
                // Versioned API routes under router prefix (default: `/api`).
                .service(web::scope(&router_prefix).configure(api::configure_routes))
        })
        .workers(worker_count);

        server = server
            .bind(&addr)
            .map_err(|e| BridgeError::from(format!("Failed to bind HTTP server to {addr}: {e}")))?;

        Ok(server.run())
    }
}

#[async_trait]
impl WebServer for BridgeWebServer {
    #[inline]
    #[instrument(name = "init-web-server", skip_all)]
    /// Initialize and start the web server
    async fn init(
        settings: &Settings,
        control_plane: Arc<dyn ControlPlane>,
    ) -> BridgeResult<Arc<Self>, InitContextError> {
        let server = Self::create_server(settings, control_plane)
            .await
            .map_err(|e| {
                InitContextError::Primitive(format!("Failed to create web server: {e}"))
            })?;
        let server_handle = server.handle();

        // Spawn server task
        tokio::spawn(async move {
            if let Err(e) = server.await {
                error!(error=%e, "Web server failed to start");
            }
        });

        let web_server = BridgeWebServer {
            server: Arc::new(Mutex::new(Some(server_handle))),
        };

        Ok(Arc::new(web_server))
    }

    #[inline]
    #[instrument(name = "web-server-stop", skip_all)]
    /// Gracefully stop the web server
    async fn stop(&self) -> BridgeResult<()> {
        info!("🛑 Stopping web server...");
        let mut server_guard = self.server.lock().await;
        if let Some(handle) = server_guard.take() {
            handle.stop(true).await;
        }
        info!("✅ Web server stopped successfully");

        Ok(())
    }
}
