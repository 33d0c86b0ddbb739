pub mod health;
pub mod simulate;
pub mod stats;

use actix_web::web;

pub use health::{dapr_subscribe, health_check, readiness, service_info};
pub use simulate::{simulate_event, SimulateResponse};
pub use stats::{get_stats, StatsResponse};

/// Register every route of the control surface.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(service_info)
        .service(health_check)
        .service(readiness)
        .service(get_stats)
        .service(simulate_event)
        .service(dapr_subscribe)
        .route("/metrics", web::get().to(crate::metrics::serve_metrics));
}
