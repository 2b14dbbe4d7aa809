//! Payment ledger service
//!
//! Consumes the payment log as a member of a consumer group and inserts each
//! valid event into the `payment_events` table:
//!
//! ```sql
//! CREATE TABLE payment_events (
//!     user_id TEXT NOT NULL,
//!     amount  INTEGER NOT NULL,
//!     status  TEXT NULL
//! );
//! ```
//!
//! The table is provisioned outside this service.

use actix_web::web;

pub mod config;
pub mod consumer;
pub mod dead_letter;
#[cfg(feature = "test-util")]
pub mod memory_store;
pub mod metrics;
pub mod writer;

pub use config::LedgerConfig;
pub use consumer::{ConsumerConfig, ConsumerError, ConsumerReport, ConsumerState, PaymentConsumer};
pub use dead_letter::{DeadLetterSink, LoggingDeadLetterSink};
pub use metrics::ConsumerMetrics;
pub use writer::{InsertError, PaymentWriter, PgPaymentWriter};

/// Register `/health` and `/metrics`; expects a `web::Data<Registry>`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(|| async { "OK" }))
        .route("/metrics", web::get().to(metrics::serve_metrics));
}
