//! Consumer loop: payment log -> store
//!
//! One [`PaymentConsumer`] drives one [`RecordSource`]. Each fetched record
//! ends in exactly one terminal outcome before its offset is committed:
//!
//! - persisted: decoded, validated and inserted;
//! - poison: no payload or undecodable, skipped;
//! - dropped: decoded but the insert failed, handed to the [`DeadLetterSink`].
//!
//! Nothing is committed before its outcome is reached, so a crash mid-record
//! leads to redelivery (at-least-once). Fetch errors never move the offset;
//! they are retried with bounded backoff.

use event_log::{FetchError, LogRecord, RecordSource};
use event_schema::{DecodeError, PaymentEvent};
use resilience::{sleep_unless, Backoff, BackoffConfig};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::dead_letter::{DeadLetterSink, LoggingDeadLetterSink};
use crate::metrics::ConsumerMetrics;
use crate::writer::PaymentWriter;

/// Lifecycle of a consumer loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Source connected, loop not yet running
    Starting,
    Running,
    /// Shutdown requested; in-flight work is finishing
    Draining,
    /// Source closed; terminal
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Upper bound on one fetch wait, and so on how long draining can take
    pub poll_interval: Duration,
    pub backoff: BackoffConfig,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            backoff: BackoffConfig::default(),
        }
    }
}

/// What one loop did over its lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    pub fetched: u64,
    pub persisted: u64,
    pub poison: u64,
    pub insert_failures: u64,
    pub fetch_retries: u64,
    pub commit_failures: u64,
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("gave up after {retries} consecutive fetch retries: {last_error}")]
    FetchRetriesExhausted {
        retries: u32,
        #[source]
        last_error: FetchError,
    },
}

pub struct PaymentConsumer<S> {
    source: S,
    writer: Arc<dyn PaymentWriter>,
    dead_letters: Arc<dyn DeadLetterSink>,
    metrics: ConsumerMetrics,
    config: ConsumerConfig,
    state: watch::Sender<ConsumerState>,
}

impl<S: RecordSource> PaymentConsumer<S> {
    /// Wrap an already connected source
    pub fn new(
        source: S,
        writer: Arc<dyn PaymentWriter>,
        metrics: ConsumerMetrics,
        config: ConsumerConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Starting);
        Self {
            source,
            writer,
            dead_letters: Arc::new(LoggingDeadLetterSink),
            metrics,
            config,
            state,
        }
    }

    pub fn with_dead_letter_sink(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = sink;
        self
    }

    /// Observe state transitions
    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    /// Run until `shutdown` turns true or fetch retries are exhausted
    ///
    /// The source is closed before returning in either case.
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ConsumerReport, ConsumerError> {
        let mut backoff = Backoff::new(self.config.backoff.clone());
        let mut report = ConsumerReport::default();

        self.state.send_replace(ConsumerState::Running);
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Payment consumer running"
        );

        let outcome = loop {
            if *shutdown.borrow() {
                info!("Shutdown signal received, draining consumer");
                break Ok(());
            }

            match self.source.fetch(self.config.poll_interval).await {
                Ok(Some(record)) => {
                    backoff.reset();
                    self.handle_record(&record, &mut report).await;
                }
                Ok(None) => backoff.reset(),
                Err(e) => match backoff.next_delay() {
                    Some(delay) => {
                        report.fetch_retries += 1;
                        self.metrics.fetch_retries.inc();
                        warn!(
                            error = %e,
                            attempt = backoff.consecutive_retries(),
                            delay_ms = delay.as_millis() as u64,
                            "Fetch failed, retrying"
                        );
                        sleep_unless(delay, shutdown_requested(&mut shutdown)).await;
                    }
                    None => {
                        error!(
                            error = %e,
                            retries = backoff.consecutive_retries(),
                            "Fetch retries exhausted, stopping consumer"
                        );
                        break Err(ConsumerError::FetchRetriesExhausted {
                            retries: backoff.consecutive_retries(),
                            last_error: e,
                        });
                    }
                },
            }
        };

        self.state.send_replace(ConsumerState::Draining);
        if let Err(e) = self.source.close().await {
            warn!(error = %e, "Record source did not close cleanly");
        }
        self.state.send_replace(ConsumerState::Stopped);

        info!(
            fetched = report.fetched,
            persisted = report.persisted,
            poison = report.poison,
            insert_failures = report.insert_failures,
            fetch_retries = report.fetch_retries,
            "Payment consumer stopped"
        );

        outcome.map(|()| report)
    }

    async fn handle_record(&self, record: &LogRecord, report: &mut ConsumerReport) {
        report.fetched += 1;
        self.metrics.records_fetched.inc();

        match decode_record(record) {
            Err(e) => {
                report.poison += 1;
                self.metrics.poison_records.inc();
                warn!(
                    partition = record.partition,
                    offset = record.offset,
                    key = %record.key_lossy(),
                    error = %e,
                    "Skipping undecodable record"
                );
            }
            Ok(event) => match self.writer.insert(&event).await {
                Ok(()) => {
                    report.persisted += 1;
                    self.metrics.records_persisted.inc();
                    debug!(
                        partition = record.partition,
                        offset = record.offset,
                        user_id = %event.user_id(),
                        "Payment event persisted"
                    );
                }
                Err(e) => {
                    report.insert_failures += 1;
                    self.metrics
                        .insert_failures
                        .with_label_values(&[e.kind()])
                        .inc();
                    warn!(
                        partition = record.partition,
                        offset = record.offset,
                        user_id = %event.user_id(),
                        kind = e.kind(),
                        error = %e,
                        "Insert failed, skipping event"
                    );
                    self.dead_letters.on_insert_failure(record, &event, &e).await;
                }
            },
        }

        if let Err(e) = self.source.commit(record).await {
            report.commit_failures += 1;
            self.metrics.commit_failures.inc();
            warn!(
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "Offset commit failed"
            );
        }
    }
}

fn decode_record(record: &LogRecord) -> Result<PaymentEvent, DecodeError> {
    match record.payload.as_deref() {
        Some(payload) => event_schema::decode(payload),
        None => Err(DecodeError::Empty),
    }
}

/// Resolves once shutdown is requested; never if the sender goes away first
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
