//! Process-wide metrics snapshot.

use crate::AppState;
use actix_web::{web, HttpResponse};
use bridge_core::BridgeControlPlane;
use bridge_error::web::WebError;
use bridge_models::{
    core::metrics::{MetricsReport, SystemInfo},
    enums::common::DeviceStatus,
    ControlPlane,
};
use bridge_repository::DeviceRepository;
use chrono::Utc;
use std::sync::Arc;

/// Configure metrics routes.
pub fn configure_metrics_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics));
}

async fn metrics(state: web::Data<Arc<AppState>>) -> Result<HttpResponse, WebError> {
    let control_plane = state.control_plane();

    let uptime_seconds = control_plane
        .downcast_ref::<BridgeControlPlane>()
        .map(|plane| (Utc::now() - plane.started_at()).num_seconds())
        .unwrap_or_default();

    let devices_total = DeviceRepository::count_total().await?;
    let devices_online = DeviceRepository::count_by_status(DeviceStatus::Online).await?;

    let report = MetricsReport {
        uptime_seconds,
        devices_total,
        devices_online,
        dispatch: control_plane.dispatch_metrics().snapshot(),
        system: SystemInfo::collect(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    Ok(HttpResponse::Ok().json(report))
}
