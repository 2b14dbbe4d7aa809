use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::warn;

use crate::AppState;

/// Liveness: the process is up and serving
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Readiness: the publisher can reach the broker
pub async fn ready(state: web::Data<AppState>) -> HttpResponse {
    match state.publisher.health_check().await {
        Ok(()) => HttpResponse::Ok().json(json!({ "status": "ready" })),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "unavailable",
                "error": e.to_string(),
            }))
        }
    }
}
