//! Bridge Control Plane common runtime
//!
//! This crate provides the shared application context, structured logging
//! and the in-process event bus used by every other crate in the workspace.

pub mod event;
mod logger;

// Re-export error types
pub use bridge_error::{BridgeError, BridgeResult};

use bridge_models::constants::{DATA_DIR, LOG_DIR};
use bridge_models::{settings::Settings, ControlPlane, DbManager, EventBus, WebServer};
use logger::Logger;
use once_cell::sync::OnceCell;
use opentelemetry::{global, metrics::MeterProvider, KeyValue};
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::{
    metrics::{PeriodicReader, SdkMeterProvider},
    Resource,
};
use std::{
    future::Future,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use sysinfo::System;
#[cfg(windows)]
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{info, instrument, span, Level};

static APP_CONTEXT: OnceCell<RwLock<BridgeAppContext>> = OnceCell::new();

pub struct BridgeAppContext {
    /// Global settings
    settings: Option<Settings>,
    /// Global logger
    logger: Logger,
    /// Event bus
    event_bus: Option<Arc<dyn EventBus>>,
    /// Database manager
    db_manager: Option<Arc<dyn DbManager>>,
    /// Web server
    web_server: Option<Arc<dyn WebServer>>,
    /// Command-dispatch engine
    control_plane: Option<Arc<dyn ControlPlane>>,
    /// Flag to prevent duplicate shutdowns
    shutting_down: AtomicBool,
    /// Shutdown token
    shutdown_token: CancellationToken,
}

impl BridgeAppContext {
    #[inline]
    pub async fn instance() -> RwLockReadGuard<'static, BridgeAppContext> {
        APP_CONTEXT
            .get()
            .expect("BridgeAppContext is not initialized")
            .read()
            .await
    }

    #[inline]
    pub async fn instance_mut() -> RwLockWriteGuard<'static, BridgeAppContext> {
        APP_CONTEXT
            .get()
            .expect("BridgeAppContext is not initialized")
            .write()
            .await
    }

    /// Initializes the global application context.
    ///
    /// Loads settings, applies the runtime directory, initializes the
    /// logger and brings the components up in dependency order. The
    /// instance is initialized only once.
    pub async fn init<E, D, W, G>(config: String) -> BridgeResult<()>
    where
        E: EventBus + 'static,
        D: DbManager + 'static,
        W: WebServer + 'static,
        G: ControlPlane + 'static,
    {
        let mut logger = Logger::new(if cfg!(debug_assertions) {
            Some(Level::DEBUG)
        } else {
            Some(Level::INFO)
        });

        // Load settings first so the runtime directory applies before the
        // logger opens its file appender under ./logs.
        let settings = Settings::new(config)?;

        if settings.web.api_key.trim().is_empty() {
            return Err(BridgeError::ConfigurationError(
                "web.api_key must be configured (or provided via the API_KEY environment variable)"
                    .into(),
            ));
        }

        apply_runtime_dir(&settings.general.runtime_dir)?;

        logger.initialize()?;

        let span = span!(Level::INFO, "init-app");
        let _guard = span.enter();

        if settings.metrics.enabled {
            Self::init_metrics(&settings);
        }

        ensure_runtime_directories()?;

        let event_bus = E::init(&settings).await;

        let mut ctx = BridgeAppContext {
            shutting_down: AtomicBool::new(false),
            shutdown_token: CancellationToken::new(),
            logger,
            settings: Some(settings),
            event_bus: Some(event_bus),
            db_manager: None,
            web_server: None,
            control_plane: None,
        };

        ctx.init_db_manager::<D>().await?;

        ctx.init_control_plane::<G>().await?;

        ctx.init_web_server::<W>().await?;

        APP_CONTEXT
            .set(RwLock::new(ctx))
            .map_err(|_| BridgeError::from("Failed to set BridgeAppContext"))?;
        Ok(())
    }

    async fn init_db_manager<D: DbManager + 'static>(&mut self) -> BridgeResult<()> {
        self.db_manager = Some(D::init(self.settings()?).await?);
        info!("Database initialized successfully.");
        Ok(())
    }

    pub async fn init_control_plane<G: ControlPlane + 'static>(&mut self) -> BridgeResult<()> {
        self.control_plane = Some(G::init(self.settings()?, self.db_manager()?).await?);
        info!("Control plane initialized successfully.");
        Ok(())
    }

    pub async fn init_web_server<W: WebServer + 'static>(&mut self) -> BridgeResult<()> {
        self.web_server = Some(W::init(self.settings()?, self.control_plane()?).await?);
        info!("Web server initialized successfully.");
        Ok(())
    }

    fn init_metrics(settings: &Settings) {
        let exporter = MetricExporter::builder()
            .with_tonic()
            .with_endpoint(&settings.metrics.endpoint)
            .build()
            .expect("Failed to create metric exporter");

        let provider = SdkMeterProvider::builder()
            .with_reader(
                PeriodicReader::builder(exporter)
                    .with_interval(Duration::from_millis(settings.metrics.export_interval))
                    .build(),
            )
            .with_resource(
                Resource::builder()
                    .with_service_name(settings.metrics.service_name.to_string())
                    .build(),
            )
            .build();

        let meter = provider.meter("system_metrics");
        let _cpu_usage = meter
            .f64_observable_up_down_counter("system.cpu.usage")
            .with_description("CPU usage percentage")
            .with_callback(|observer| {
                let mut sys = System::new_all();
                sys.refresh_all();

                observer.observe(
                    sys.global_cpu_usage() as f64,
                    &[KeyValue::new("type", "cpu")],
                );
            })
            .build();
        let _memory_usage = meter
            .f64_observable_up_down_counter("system.memory.usage")
            .with_description("Memory usage percentage")
            .with_callback(|observer| {
                let mut sys = System::new_all();
                sys.refresh_all();

                observer.observe(
                    ((sys.used_memory() as f64) / (sys.total_memory() as f64)) * 100.0,
                    &[KeyValue::new("type", "memory")],
                );
            })
            .build();
        global::set_meter_provider(provider);
    }

    #[inline]
    /// Gets a reference to the settings
    pub fn settings(&self) -> BridgeResult<&Settings> {
        self.settings
            .as_ref()
            .ok_or(BridgeError::from("Settings not initialized"))
    }

    #[inline]
    /// Gets a reference to the event bus
    pub fn event_bus(&self) -> BridgeResult<Arc<dyn EventBus>> {
        self.event_bus
            .as_ref()
            .ok_or(BridgeError::from("Event bus not initialized"))
            .map(Arc::clone)
    }

    #[inline]
    /// Gets a reference to the database manager
    pub fn db_manager(&self) -> BridgeResult<Arc<dyn DbManager>> {
        self.db_manager
            .as_ref()
            .ok_or(BridgeError::from("Database manager not initialized"))
            .map(Arc::clone)
    }

    #[inline]
    /// Gets a reference to the web server
    pub fn web_server(&self) -> BridgeResult<Arc<dyn WebServer>> {
        self.web_server
            .as_ref()
            .ok_or(BridgeError::from("Web server not initialized"))
            .map(Arc::clone)
    }

    #[inline]
    /// Gets a reference to the control plane
    pub fn control_plane(&self) -> BridgeResult<Arc<dyn ControlPlane>> {
        self.control_plane
            .as_ref()
            .ok_or(BridgeError::from("Control plane not initialized"))
            .map(Arc::clone)
    }

    #[inline]
    pub fn change_log_level(&self, level: Level) {
        self.logger.set_level(level);
    }

    /// Runs the control plane until a shutdown signal arrives.
    pub async fn run(&self) -> BridgeResult<()> {
        self.listen_for_shutdown(async { self.graceful_shutdown().await })
            .await
    }

    async fn listen_for_shutdown<F>(&self, shutdown_fn: F) -> BridgeResult<()>
    where
        F: Future<Output = BridgeResult<()>>,
    {
        let shutdown_token = self.shutdown_token.clone();

        #[cfg(unix)]
        {
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT signal");
                }
                _ = shutdown_token.cancelled() => {}
            }
        }

        #[cfg(windows)]
        {
            tokio::select! {
                _ = ctrl_c() => {
                    info!("Received ctrl-c signal");
                }
                _ = shutdown_token.cancelled() => {}
            }
        }

        shutdown_fn.await
    }

    #[inline]
    #[instrument(name = "graceful-shutdown", skip_all)]
    /// Initiates a graceful shutdown process
    pub async fn graceful_shutdown(&self) -> BridgeResult<()> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("🛑 Starting graceful shutdown...");

        let tracker = TaskTracker::new();
        // Shutdown components in reverse order of initialization
        if let Some(control_plane) = &self.control_plane {
            let control_plane = Arc::clone(control_plane);
            tracker.spawn(async move {
                let _ = control_plane.stop().await;
            });
        }
        if let Some(web_server) = &self.web_server {
            let web_server = Arc::clone(web_server);
            tracker.spawn(async move {
                let _ = web_server.stop().await;
            });
        }
        if let Some(db_manager) = &self.db_manager {
            let db_manager = Arc::clone(db_manager);
            tracker.spawn(async move {
                let _ = db_manager.close().await;
            });
        }

        info!("⏳ Waiting for all components to shutdown gracefully...");
        tracker.close();
        tracker.wait().await;

        info!("✅ Graceful shutdown completed successfully");
        std::process::exit(0);
    }
}

/// Apply the configured runtime directory by switching the process working
/// directory. Relative paths (`./data`, `./logs`) then resolve under one
/// relocatable runtime root.
fn apply_runtime_dir(runtime_dir: &str) -> BridgeResult<()> {
    let dir = runtime_dir.trim();
    if dir.is_empty() || dir == "." {
        return Ok(());
    }

    std::fs::create_dir_all(dir)
        .map_err(|e| BridgeError::from(format!("Failed to create runtime_dir {}: {}", dir, e)))?;

    std::env::set_current_dir(dir).map_err(|e| {
        BridgeError::from(format!(
            "Failed to set current_dir to runtime_dir {}: {}",
            dir, e
        ))
    })?;

    Ok(())
}

/// Ensure required runtime directories exist. Safe to call multiple times.
fn ensure_runtime_directories() -> BridgeResult<()> {
    for dir in [Path::new(DATA_DIR), Path::new(LOG_DIR)] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            return Err(BridgeError::from(format!(
                "Failed to create directory {}: {}",
                dir.display(),
                e
            )));
        }
    }

    Ok(())
}
