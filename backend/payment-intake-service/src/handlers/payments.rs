//! Payment intake handler
//!
//! Decodes the request body into a [`PaymentEvent`], re-encodes it in the log
//! wire form and publishes it keyed by `user_id`. A 200 is returned only after
//! the broker acknowledged the record. Publish failures are surfaced, never
//! retried here.

use actix_web::{web, HttpResponse};
use event_schema::PaymentEvent;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{IntakeError, Result};
use crate::metrics;
use crate::AppState;

pub async fn publish_payment(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let result = accept(&state, &body).await;

    match &result {
        Ok(()) => metrics::record_request("accepted"),
        Err(err) => metrics::record_request(err.outcome()),
    }

    result.map(|()| HttpResponse::Ok().json(json!({ "status": "event published" })))
}

async fn accept(state: &AppState, body: &[u8]) -> Result<()> {
    let event: PaymentEvent = event_schema::decode(body).map_err(|e| {
        debug!(error = %e, "Rejected payment payload");
        IntakeError::from(e)
    })?;

    let payload = event_schema::encode(&event).map_err(|e| {
        warn!(user_id = %event.user_id(), error = %e, "Failed to encode payment event");
        IntakeError::from(e)
    })?;

    state
        .publisher
        .publish(event.partition_key(), &payload)
        .await
        .map_err(|e| {
            warn!(
                user_id = %event.user_id(),
                kind = e.kind(),
                error = %e,
                "Payment event delivery failed"
            );
            IntakeError::from(e)
        })?;

    debug!(user_id = %event.user_id(), amount = event.amount(), "Payment event published");
    Ok(())
}
