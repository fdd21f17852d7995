use bridge_common::{event::BridgeEventBus, BridgeAppContext};
use bridge_core::BridgeControlPlane;
use bridge_error::{BridgeError, BridgeResult};
use bridge_models::{constants::DEFAULT_CONFIG_FILE_NAME, event::ApplicationReady, EventBus};
use bridge_storage::BridgeDbManager;
use bridge_web::BridgeWebServer;
use clap::Parser;
use std::{env::current_dir, path::PathBuf};

/// Bridge - device control plane for control-room installations
///
/// Dispatches idempotent commands to remote edge devices (displays,
/// codecs, switchers, sensors), tracks device liveness and streams state
/// changes to connected operator sessions.
#[derive(Parser)]
#[command(name = "bridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bridge Control Plane", long_about = None)]
struct Cli {
    /// Sets a custom config file with full path
    ///
    /// If not specified, the control plane will look for 'bridge.toml'
    /// in the current working directory.
    #[arg(short, long, env = "BRIDGE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> BridgeResult<()> {
    let cli = Cli::parse();

    // Determine the configuration file path
    let config_path = match cli.config {
        Some(p) => p,
        None => {
            let dir = current_dir()
                .map_err(|e| BridgeError::from(format!("Failed to get current directory: {e}")))?;
            dir.join(DEFAULT_CONFIG_FILE_NAME)
        }
    };

    let config_path_str = config_path.to_string_lossy().to_string();

    // Initialize the application context with all required components
    BridgeAppContext::init::<BridgeEventBus, BridgeDbManager, BridgeWebServer, BridgeControlPlane>(
        config_path_str,
    )
    .await?;

    // Get the application context instance
    let ctx = BridgeAppContext::instance().await;

    // Publish ApplicationReady event to notify all subscribers
    let event_bus = ctx.event_bus()?;
    let bus = event_bus.downcast_ref::<BridgeEventBus>().ok_or_else(|| {
        BridgeError::from("Failed to downcast event bus to BridgeEventBus (unexpected context wiring)")
    })?;
    bus.publish::<ApplicationReady>(ApplicationReady).await?;

    // Run the application until shutdown signal is received
    ctx.run().await
}
