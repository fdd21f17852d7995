//! V1 version API routes
mod command;
mod device;
mod ws;

use crate::middleware::auth::ApiKeyAuth;
use actix_web::web;

/// Configure all v1 routes
pub fn configure_v1_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(configure_public_routes)
        .configure(configure_protected_routes);
}

/// Routes exempt from the shared secret: the operator feed serves the
/// operator UI, which has its own session handling upstream.
fn configure_public_routes(cfg: &mut web::ServiceConfig) {
    cfg.route(
        format!("{}/operator", ws::ROUTER_PREFIX).as_str(),
        web::get().to(ws::operator::operator_ws),
    );
}

/// Device REST surface and the device transport, behind the API key.
fn configure_protected_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("")
            .wrap(ApiKeyAuth)
            .service(
                web::scope(device::ROUTER_PREFIX)
                    .configure(device::configure_routes)
                    .configure(command::configure_routes),
            )
            .route(
                format!("{}/device", ws::ROUTER_PREFIX).as_str(),
                web::get().to(ws::device::device_ws),
            ),
    );
}
