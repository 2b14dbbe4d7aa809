//! Hook for records that decoded but could not be stored
//!
//! The consumer commits past such records, so whatever a sink does with them
//! is the only trace left once the offset moves.

use async_trait::async_trait;
use event_log::LogRecord;
use event_schema::PaymentEvent;
use tracing::error;

use crate::writer::InsertError;

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn on_insert_failure(
        &self,
        record: &LogRecord,
        event: &PaymentEvent,
        error: &InsertError,
    );
}

/// Sink that only logs the dropped event
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LoggingDeadLetterSink {
    async fn on_insert_failure(
        &self,
        record: &LogRecord,
        event: &PaymentEvent,
        error: &InsertError,
    ) {
        error!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            user_id = %event.user_id(),
            amount = event.amount(),
            kind = error.kind(),
            error = %error,
            "Payment event dropped after failed insert"
        );
    }
}
