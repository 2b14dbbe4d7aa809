//! HTTP intake through the log into the store, with the broker and the
//! database replaced by their in-memory counterparts.

use actix_web::{test, web, App};
use event_log::memory::MemoryLog;
use payment_intake_service::AppState;
use payment_ledger_service::memory_store::{MemoryPaymentStore, PaymentRow};
use payment_ledger_service::{ConsumerConfig, ConsumerMetrics, ConsumerReport, PaymentConsumer};
use prometheus::Registry;
use resilience::BackoffConfig;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const GROUP: &str = "payment_group";

struct Pipeline {
    log: MemoryLog,
    store: Arc<MemoryPaymentStore>,
}

impl Pipeline {
    fn new() -> Self {
        Self {
            log: MemoryLog::new("payment_events", 3),
            store: Arc::new(MemoryPaymentStore::new()),
        }
    }

    fn intake_state(&self) -> web::Data<AppState> {
        web::Data::new(AppState::new(Arc::new(self.log.publisher())))
    }

    /// Consume until every stored record has been committed, then shut down
    async fn drain(&self) -> ConsumerReport {
        let consumer = PaymentConsumer::new(
            self.log.subscribe(GROUP),
            self.store.clone(),
            ConsumerMetrics::new(&Registry::new()).unwrap(),
            ConsumerConfig {
                poll_interval: Duration::from_millis(20),
                backoff: BackoffConfig::fixed(Duration::from_millis(5)),
            },
        );
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(consumer.run(rx));

        let log = self.log.clone();
        tokio::time::timeout(Duration::from_secs(5), async move {
            loop {
                let done = (0..log.partition_count() as i32).all(|p| {
                    let stored = log.partition_records(p).len() as i64;
                    stored == 0 || log.committed_offset(GROUP, p) == Some(stored)
                });
                if done {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("consumer did not catch up");

        shutdown.send(true).unwrap();
        handle.await.unwrap().unwrap()
    }
}

#[actix_web::test]
async fn test_accepted_payment_is_persisted() {
    let pipeline = Pipeline::new();
    let app = test::init_service(
        App::new()
            .app_data(pipeline.intake_state())
            .configure(payment_intake_service::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/payment")
        .set_json(json!({ "user_id": "u1", "amount": 100 }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let report = pipeline.drain().await;

    assert_eq!(report.persisted, 1);
    assert_eq!(
        pipeline.store.rows(),
        vec![PaymentRow {
            user_id: "u1".to_string(),
            amount: 100,
            status: None,
        }]
    );
}

#[actix_web::test]
async fn test_rejected_payment_never_reaches_the_log() {
    let pipeline = Pipeline::new();
    let app = test::init_service(
        App::new()
            .app_data(pipeline.intake_state())
            .configure(payment_intake_service::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/payment")
        .set_json(json!({ "amount": 100 }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    assert!(pipeline.log.records().is_empty());
    let report = pipeline.drain().await;
    assert_eq!(report.fetched, 0);
    assert!(pipeline.store.rows().is_empty());
}

#[actix_web::test]
async fn test_broker_outage_surfaces_to_the_caller() {
    let pipeline = Pipeline::new();
    pipeline.log.set_unavailable(true);
    let app = test::init_service(
        App::new()
            .app_data(pipeline.intake_state())
            .configure(payment_intake_service::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/payment")
        .set_json(json!({ "user_id": "u1", "amount": 100 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("event delivery failed"));

    pipeline.log.set_unavailable(false);
    assert!(pipeline.log.records().is_empty());
}

#[actix_web::test]
async fn test_poison_record_is_skipped_and_next_event_persisted() {
    let pipeline = Pipeline::new();
    let app = test::init_service(
        App::new()
            .app_data(pipeline.intake_state())
            .configure(payment_intake_service::configure),
    )
    .await;

    pipeline
        .log
        .append_raw(Some(&b"u2"[..]), Some(&b"\x00\x01not-an-event"[..]));

    let req = test::TestRequest::post()
        .uri("/payment")
        .set_json(json!({ "user_id": "u2", "amount": 30, "status": "settled" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let report = pipeline.drain().await;

    assert_eq!(report.poison, 1);
    assert_eq!(report.persisted, 1);
    assert_eq!(
        pipeline.store.rows(),
        vec![PaymentRow {
            user_id: "u2".to_string(),
            amount: 30,
            status: Some("settled".to_string()),
        }]
    );
}

#[actix_web::test]
async fn test_per_user_order_survives_the_pipeline() {
    let pipeline = Pipeline::new();
    let app = test::init_service(
        App::new()
            .app_data(pipeline.intake_state())
            .configure(payment_intake_service::configure),
    )
    .await;

    for amount in 1..=6 {
        for user in ["u1", "u2"] {
            let req = test::TestRequest::post()
                .uri("/payment")
                .set_json(json!({ "user_id": user, "amount": amount }))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), 200);
        }
    }

    pipeline.drain().await;

    let rows = pipeline.store.rows();
    for user in ["u1", "u2"] {
        let amounts: Vec<i64> = rows
            .iter()
            .filter(|r| r.user_id == user)
            .map(|r| r.amount)
            .collect();
        assert_eq!(amounts, vec![1, 2, 3, 4, 5, 6]);
    }
}
