use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, TextEncoder};

static PAYMENT_INTAKE_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "payment_intake_requests_total",
            "Payment intake requests by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create payment_intake_requests_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register payment_intake_requests_total");
    counter
});

pub fn record_request(outcome: &str) {
    PAYMENT_INTAKE_REQUESTS_TOTAL
        .with_label_values(&[outcome])
        .inc();
}

/// Current count for one outcome
pub fn request_count(outcome: &str) -> u64 {
    PAYMENT_INTAKE_REQUESTS_TOTAL
        .with_label_values(&[outcome])
        .get()
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
