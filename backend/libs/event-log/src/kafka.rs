//! rdkafka-backed publisher and record source

use async_trait::async_trait;
use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use resilience::with_timeout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{EventPublisher, FetchError, LogRecord, PublishError, RecordSource};

/// Producer configuration
#[derive(Debug, Clone)]
pub struct KafkaProducerConfig {
    pub brokers: String,
    pub topic: String,
    /// How long a publish waits for broker acknowledgement
    pub ack_timeout: Duration,
}

/// Upper bound on the metadata request used to tell a slow broker from a
/// missing one after a send timed out
const REACHABILITY_TIMEOUT: Duration = Duration::from_millis(500);

/// Producer context that remembers whether librdkafka last reported the
/// cluster as unreachable
///
/// librdkafka keeps retrying refused connections until `message.timeout.ms`,
/// so a send to a dead cluster only ever fails with `MessageTimedOut`. The
/// client-level error callback is where the connection failures show up.
#[derive(Clone, Default)]
pub struct BrokerStateContext {
    unreachable: Arc<AtomicBool>,
}

impl BrokerStateContext {
    pub fn is_unreachable(&self) -> bool {
        self.unreachable.load(Ordering::Acquire)
    }

    fn mark_reachable(&self) {
        self.unreachable.store(false, Ordering::Release);
    }
}

impl ClientContext for BrokerStateContext {
    fn error(&self, error: KafkaError, reason: &str) {
        if matches!(
            error.rdkafka_error_code(),
            Some(
                RDKafkaErrorCode::AllBrokersDown
                    | RDKafkaErrorCode::BrokerTransportFailure
                    | RDKafkaErrorCode::Resolve
            )
        ) {
            self.unreachable.store(true, Ordering::Release);
        }
        warn!(error = %error, reason = reason, "Kafka client error");
    }
}

/// Kafka producer bound to a single topic
///
/// The underlying `FutureProducer` is thread-safe and pipelines concurrent
/// sends; clones of the handle share one connection.
pub struct KafkaPublisher {
    producer: FutureProducer<BrokerStateContext>,
    broker_state: BrokerStateContext,
    topic: String,
    ack_timeout: Duration,
    closed: AtomicBool,
}

impl KafkaPublisher {
    pub fn new(config: KafkaProducerConfig) -> Result<Self, PublishError> {
        let broker_state = BrokerStateContext::default();
        let producer: FutureProducer<BrokerStateContext> = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", config.ack_timeout.as_millis().to_string())
            .set("enable.idempotence", "true") // keeps per-partition order across internal retries
            .set("acks", "all")
            .set("max.in.flight.requests.per.connection", "5")
            .set("compression.type", "lz4")
            .create_with_context(broker_state.clone())
            .map_err(|e| PublishError::Other(format!("failed to create producer: {e}")))?;

        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            ack_timeout_ms = config.ack_timeout.as_millis() as u64,
            "Kafka publisher initialized"
        );

        Ok(Self {
            producer,
            broker_state,
            topic: config.topic,
            ack_timeout: config.ack_timeout,
            closed: AtomicBool::new(false),
        })
    }

    /// Request topic metadata off the async runtime
    async fn fetch_topic_metadata(&self, timeout: Duration) -> Result<(), PublishError> {
        // fetch_metadata blocks the calling thread
        let producer = self.producer.clone();
        let topic = self.topic.clone();
        tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(Some(topic.as_str()), timeout)
                .map(|_| ())
        })
        .await
        .map_err(|e| PublishError::Other(format!("metadata task failed: {e}")))?
        .map_err(|e| classify_kafka_error(&e, timeout))
    }

    /// Decide whether a timed-out send hit a slow broker or no broker at all
    async fn timed_out(&self) -> PublishError {
        if self.broker_state.is_unreachable() {
            warn!(topic = %self.topic, "Kafka send timed out with no reachable broker");
            return PublishError::BrokerUnavailable(format!(
                "no broker reachable within {:?}",
                self.ack_timeout
            ));
        }

        match self.fetch_topic_metadata(REACHABILITY_TIMEOUT).await {
            Ok(()) => {
                self.broker_state.mark_reachable();
                warn!("Kafka send timed out after {:?}", self.ack_timeout);
                PublishError::Timeout(self.ack_timeout)
            }
            Err(e) => {
                warn!(topic = %self.topic, error = %e, "Kafka send timed out and metadata request failed");
                PublishError::BrokerUnavailable(format!("broker did not answer metadata request: {e}"))
            }
        }
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, key: &[u8], value: &[u8]) -> Result<(), PublishError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PublishError::Closed);
        }

        let record = FutureRecord::to(&self.topic).key(key).payload(value);

        match with_timeout(self.ack_timeout, self.producer.send(record, self.ack_timeout)).await {
            Ok(Ok((partition, offset))) => {
                self.broker_state.mark_reachable();
                debug!(
                    topic = %self.topic,
                    partition = partition,
                    offset = offset,
                    "Record acknowledged"
                );
                Ok(())
            }
            Ok(Err((err, _))) => match classify_kafka_error(&err, self.ack_timeout) {
                PublishError::Timeout(_) => Err(self.timed_out().await),
                other => Err(other),
            },
            Err(_) => Err(self.timed_out().await),
        }
    }

    async fn close(&self) -> Result<(), PublishError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Kafka publisher already closed");
            return Ok(());
        }

        // librdkafka's flush blocks the calling thread
        let producer = self.producer.clone();
        let flush_timeout = self.ack_timeout;
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(flush_timeout)))
            .await
            .map_err(|e| PublishError::Other(format!("flush task failed: {e}")))?
            .map_err(|e| classify_kafka_error(&e, flush_timeout))?;

        info!(topic = %self.topic, "Kafka publisher flushed and closed");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), PublishError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PublishError::Closed);
        }

        self.fetch_topic_metadata(self.ack_timeout).await?;
        self.broker_state.mark_reachable();
        Ok(())
    }
}

/// Map librdkafka failures onto the publish error taxonomy
pub fn classify_kafka_error(err: &KafkaError, ack_timeout: Duration) -> PublishError {
    match err.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::MessageTimedOut
            | RDKafkaErrorCode::RequestTimedOut
            | RDKafkaErrorCode::OperationTimedOut,
        ) => PublishError::Timeout(ack_timeout),
        Some(
            RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::BrokerNotAvailable
            | RDKafkaErrorCode::NetworkException
            | RDKafkaErrorCode::Resolve,
        ) => PublishError::BrokerUnavailable(err.to_string()),
        _ => PublishError::Other(err.to_string()),
    }
}

/// Consumer configuration for one group member
#[derive(Debug, Clone)]
pub struct KafkaConsumerConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub session_timeout: Duration,
    /// Bound on the startup metadata request
    pub connect_timeout: Duration,
}

impl KafkaConsumerConfig {
    pub fn new(
        brokers: impl Into<String>,
        topic: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            brokers: brokers.into(),
            topic: topic.into(),
            group_id: group_id.into(),
            session_timeout: Duration::from_secs(45),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Kafka consumer-group member with manual offset commits
pub struct KafkaRecordSource {
    consumer: StreamConsumer,
    topic: String,
    group_id: String,
    closed: AtomicBool,
}

impl KafkaRecordSource {
    /// Create the consumer, subscribe, and confirm the broker answers
    ///
    /// Any failure here means the member has no position to consume from.
    pub async fn connect(config: &KafkaConsumerConfig) -> Result<Self, FetchError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false") // commit after each terminal outcome
            .set("auto.offset.reset", "earliest")
            .set(
                "session.timeout.ms",
                config.session_timeout.as_millis().to_string(),
            )
            .set("max.poll.interval.ms", "300000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| FetchError::Connection(format!("failed to create consumer: {e}")))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| FetchError::Connection(format!("failed to subscribe: {e}")))?;

        // fetch_metadata blocks the calling thread for up to connect_timeout
        let topic = config.topic.clone();
        let connect_timeout = config.connect_timeout;
        let consumer = tokio::task::spawn_blocking(move || {
            consumer
                .fetch_metadata(Some(topic.as_str()), connect_timeout)
                .map(|_| consumer)
        })
        .await
        .map_err(|e| FetchError::Connection(format!("metadata task failed: {e}")))?
        .map_err(|e| {
            FetchError::Connection(format!("broker unreachable at {}: {e}", config.brokers))
        })?;

        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            "Kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
            group_id: config.group_id.clone(),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl RecordSource for KafkaRecordSource {
    async fn fetch(&self, max_wait: Duration) -> Result<Option<LogRecord>, FetchError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FetchError::Closed);
        }

        match with_timeout(max_wait, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(FetchError::Transport(e.to_string())),
            Ok(Ok(message)) => Ok(Some(LogRecord {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message.key().map(<[u8]>::to_vec),
                payload: message.payload().map(<[u8]>::to_vec),
            })),
        }
    }

    async fn commit(&self, record: &LogRecord) -> Result<(), FetchError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &record.topic,
            record.partition,
            Offset::Offset(record.offset + 1),
        )
        .map_err(|e| FetchError::Commit(e.to_string()))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| FetchError::Commit(e.to_string()))
    }

    async fn close(&self) -> Result<(), FetchError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.consumer.unsubscribe();
        info!(
            topic = %self.topic,
            group_id = %self.group_id,
            "Kafka consumer left group"
        );
        Ok(())
    }
}
