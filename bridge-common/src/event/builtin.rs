use super::BridgeEventBus;
use bridge_error::BridgeResult;
use bridge_models::event::ApplicationReady;
use bridge_models::EventBus;
use colored::Colorize;

pub(super) async fn register_builtin_events(event_bus: &BridgeEventBus) {
    event_bus
        .register_handler::<ApplicationReady, _>(application_is_ready)
        .await;
}

fn application_is_ready(_: &ApplicationReady) -> BridgeResult<()> {
    let version = env!("CARGO_PKG_VERSION");

    println!();
    println!("{}", "Bridge Control Plane".bright_green().bold());
    println!(
        "{} {}",
        "Version:".bright_yellow(),
        format!("v{version}").bright_white()
    );
    println!(
        "{} {}",
        "License:".bright_yellow(),
        "Apache License 2.0".bright_white()
    );
    println!();

    Ok(())
}
