//! API endpoint modules.

pub mod health;
pub mod ingest;
pub mod openapi;
pub mod status;

use actix_web::web;

pub use health::configure_health_routes;
pub use ingest::{IntakeLimits, configure_ingest_routes};
pub use openapi::ApiDoc;
pub use status::configure_status_routes;

/// Register every `/api/v1` route.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(configure_health_routes)
        .configure(configure_ingest_routes)
        .configure(configure_status_routes);
}
