//! # Event log seams
//!
//! The payment pipeline talks to its log through two traits:
//!
//! - [`EventPublisher`]: send one keyed record and wait for the broker to
//!   acknowledge it. Records sharing a key land on the same partition, so
//!   consumers observe them in publish order. Nothing is promised across keys.
//! - [`RecordSource`]: pull records for one consumer-group member, and commit
//!   its position once a record has reached a terminal outcome. A record that
//!   is fetched but never committed is delivered again after a restart
//!   (at-least-once).
//!
//! [`kafka`] implements both on rdkafka. With the `test-util` feature,
//! [`memory`] provides an in-process partitioned log with fault injection.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use event_log::{EventPublisher, KafkaProducerConfig, KafkaPublisher};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let publisher = KafkaPublisher::new(KafkaProducerConfig {
//!         brokers: "localhost:9092".to_string(),
//!         topic: "payment_events".to_string(),
//!         ack_timeout: Duration::from_secs(5),
//!     })?;
//!
//!     publisher.publish(b"u1", br#"{"user_id":"u1","amount":100}"#).await?;
//!     publisher.close().await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

mod error;
pub mod kafka;
#[cfg(feature = "test-util")]
pub mod memory;

pub use error::{FetchError, PublishError};
pub use kafka::{KafkaConsumerConfig, KafkaProducerConfig, KafkaPublisher, KafkaRecordSource};

/// One record read from the log, detached from the client that fetched it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

impl LogRecord {
    /// Key rendered for log fields
    pub fn key_lossy(&self) -> String {
        self.key
            .as_deref()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .unwrap_or_default()
    }
}

/// Outbound side of the log
///
/// Implementations are shared between request handlers and must be safe to
/// call concurrently without external locking.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one record keyed by `key`, waiting for acknowledgement
    async fn publish(&self, key: &[u8], value: &[u8]) -> Result<(), PublishError>;

    /// Flush buffered records and release the connection
    ///
    /// Calling this on an already-closed publisher succeeds.
    async fn close(&self) -> Result<(), PublishError>;

    /// Cheap reachability check for readiness endpoints
    async fn health_check(&self) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Inbound side of the log for one consumer-group member
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Wait up to `max_wait` for the next record
    ///
    /// `Ok(None)` means nothing arrived in time; it is not an error.
    async fn fetch(&self, max_wait: Duration) -> Result<Option<LogRecord>, FetchError>;

    /// Mark `record` (and everything before it on its partition) as consumed
    async fn commit(&self, record: &LogRecord) -> Result<(), FetchError>;

    /// Leave the group and release the connection
    async fn close(&self) -> Result<(), FetchError>;
}

#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish(&self, key: &[u8], value: &[u8]) -> Result<(), PublishError> {
        (**self).publish(key, value).await
    }

    async fn close(&self) -> Result<(), PublishError> {
        (**self).close().await
    }

    async fn health_check(&self) -> Result<(), PublishError> {
        (**self).health_check().await
    }
}

#[async_trait]
impl<T: RecordSource + ?Sized> RecordSource for Arc<T> {
    async fn fetch(&self, max_wait: Duration) -> Result<Option<LogRecord>, FetchError> {
        (**self).fetch(max_wait).await
    }

    async fn commit(&self, record: &LogRecord) -> Result<(), FetchError> {
        (**self).commit(record).await
    }

    async fn close(&self) -> Result<(), FetchError> {
        (**self).close().await
    }
}
