mod health;
mod metrics;

use actix_web::web;

pub fn configure_public_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(health::configure_health_routes)
        .configure(metrics::configure_metrics_routes);
}
