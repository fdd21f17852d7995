use actix_web::{web, HttpResponse};
use actix_web_validator::{Json, Path, Query};
use bridge_error::{web::WebError, WebResult};
use bridge_models::{
    domain::prelude::{CursorPage, DeviceDetail, DevicePageParams, PathId, UpdateDevice},
    entities::prelude::DeviceModel,
    web::WebResponse,
};
use bridge_repository::{DeviceRepository, TelemetryRepository};
use sea_orm::DatabaseConnection;

pub(super) const ROUTER_PREFIX: &str = "/devices";

/// Recent-telemetry window returned with a device detail.
const DETAIL_TELEMETRY_LIMIT: u64 = 50;

pub(crate) fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(page))
        .route("/{id}", web::get().to(get_by_id))
        .route("/{id}", web::put().to(update))
        .route("/{id}/heartbeat", web::post().to(heartbeat));
}

/// Keyset-paginated device listing with status/kind/name filters.
pub async fn page(
    params: Query<DevicePageParams>,
) -> WebResult<WebResponse<CursorPage<DeviceModel>>> {
    Ok(WebResponse::ok(
        DeviceRepository::list_page(params.into_inner()).await?,
    ))
}

/// Device detail: the row, its recent telemetry window and the concurrency
/// token callers echo back on update.
pub async fn get_by_id(req: Path<PathId>) -> WebResult<WebResponse<DeviceDetail>> {
    let device = DeviceRepository::find_by_id(&req.id, None::<&DatabaseConnection>)
        .await?
        .ok_or_else(|| WebError::NotFound(format!("device {}", req.id)))?;
    let telemetry = TelemetryRepository::recent(&device.id, DETAIL_TELEMETRY_LIMIT).await?;
    let version = device.version;

    Ok(WebResponse::ok(DeviceDetail {
        device,
        telemetry,
        version,
    }))
}

/// Operator update of mutable device fields; a stale version token is a
/// conflict.
pub async fn update(
    req: Path<PathId>,
    payload: Json<UpdateDevice>,
) -> WebResult<WebResponse<DeviceModel>> {
    let updated = DeviceRepository::apply_update(&req.id, payload.into_inner()).await?;
    Ok(WebResponse::ok(updated))
}

/// Explicit heartbeat: refreshes last-seen and forces the device online.
pub async fn heartbeat(req: Path<PathId>) -> Result<HttpResponse, WebError> {
    let known =
        DeviceRepository::touch_last_seen(&req.id, true, None::<&DatabaseConnection>).await?;
    if !known {
        return Err(WebError::NotFound(format!("device {}", req.id)));
    }
    Ok(HttpResponse::Ok().json(WebResponse::<()>::ok_empty()))
}
