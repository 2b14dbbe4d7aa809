use actix_web::{web, HttpResponse};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters shared by every consumer loop in the process
#[derive(Clone)]
pub struct ConsumerMetrics {
    pub records_fetched: IntCounter,
    pub records_persisted: IntCounter,
    pub poison_records: IntCounter,
    pub insert_failures: IntCounterVec,
    pub fetch_retries: IntCounter,
    pub commit_failures: IntCounter,
}

impl ConsumerMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let records_fetched = IntCounter::new(
            "payment_ledger_records_fetched_total",
            "Records fetched from the payment log",
        )?;
        let records_persisted = IntCounter::new(
            "payment_ledger_records_persisted_total",
            "Payment events inserted into the store",
        )?;
        let poison_records = IntCounter::new(
            "payment_ledger_poison_records_total",
            "Records skipped because they could not be decoded",
        )?;
        let insert_failures = IntCounterVec::new(
            Opts::new(
                "payment_ledger_insert_failures_total",
                "Payment events skipped after a failed insert",
            ),
            &["kind"],
        )?;
        let fetch_retries = IntCounter::new(
            "payment_ledger_fetch_retries_total",
            "Fetch attempts retried after a transport error",
        )?;
        let commit_failures = IntCounter::new(
            "payment_ledger_commit_failures_total",
            "Offset commits that failed",
        )?;

        registry.register(Box::new(records_fetched.clone()))?;
        registry.register(Box::new(records_persisted.clone()))?;
        registry.register(Box::new(poison_records.clone()))?;
        registry.register(Box::new(insert_failures.clone()))?;
        registry.register(Box::new(fetch_retries.clone()))?;
        registry.register(Box::new(commit_failures.clone()))?;

        Ok(Self {
            records_fetched,
            records_persisted,
            poison_records,
            insert_failures,
            fetch_retries,
            commit_failures,
        })
    }
}

pub async fn serve_metrics(registry: web::Data<Registry>) -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
