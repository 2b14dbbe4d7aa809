//! Payment intake HTTP service
//!
//! Accepts `POST /payment` and publishes each event to the payment log,
//! partitioned by `user_id`.

use actix_web::web;
use event_log::EventPublisher;
use std::sync::Arc;

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;

pub use config::IntakeConfig;
pub use error::IntakeError;

/// Shared state handed to every worker
#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<dyn EventPublisher>,
}

impl AppState {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }
}

/// Register the intake routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/payment", web::post().to(handlers::publish_payment))
        .route("/health", web::get().to(handlers::health))
        .route("/ready", web::get().to(handlers::ready))
        .route("/metrics", web::get().to(metrics::serve_metrics));
}
