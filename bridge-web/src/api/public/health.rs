//! Health check endpoints.
//!
//! A root `/health` endpoint keeps load balancers and liveness probes
//! independent of the API router prefix and the shared secret.

use actix_web::{web, HttpResponse};

/// Configure health check routes.
pub fn configure_health_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));
}

/// Simple health check handler.
async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}
