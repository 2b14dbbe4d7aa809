/// Configuration management
use event_log::KafkaConsumerConfig;
use resilience::BackoffConfig;
use serde::Deserialize;
use std::time::Duration;

use crate::consumer::ConsumerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_kafka_broker")]
    pub kafka_broker: String,
    #[serde(default = "default_kafka_topic")]
    pub kafka_topic: String,
    #[serde(default = "default_kafka_group_id")]
    pub kafka_group_id: String,
    /// Port for `/health` and `/metrics`
    #[serde(default = "default_ledger_http_port")]
    pub ledger_http_port: u16,
    /// Upper bound on a single fetch wait
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_fetch_retry_backoff_ms")]
    pub fetch_retry_backoff_ms: u64,
    #[serde(default = "default_fetch_retry_max_backoff_ms")]
    pub fetch_retry_max_backoff_ms: u64,
    /// 1.0 keeps the delay fixed; larger values grow it up to the max
    #[serde(default = "default_fetch_retry_multiplier")]
    pub fetch_retry_multiplier: f64,
    /// Consecutive fetch failures tolerated before a loop gives up
    #[serde(default)]
    pub max_fetch_retries: Option<u32>,
    /// Consumer loops run in this process, each its own group member
    #[serde(default = "default_consumer_instances")]
    pub consumer_instances: usize,
}

fn default_kafka_broker() -> String {
    "localhost:9092".to_string()
}

fn default_kafka_topic() -> String {
    event_schema::topics::PAYMENT_EVENTS.to_string()
}

fn default_kafka_group_id() -> String {
    event_schema::DEFAULT_CONSUMER_GROUP.to_string()
}

fn default_ledger_http_port() -> u16 {
    8001
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_fetch_retry_backoff_ms() -> u64 {
    1000
}

fn default_fetch_retry_max_backoff_ms() -> u64 {
    30_000
}

fn default_fetch_retry_multiplier() -> f64 {
    1.0
}

fn default_consumer_instances() -> usize {
    1
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn kafka_consumer_config(&self) -> KafkaConsumerConfig {
        KafkaConsumerConfig::new(&self.kafka_broker, &self.kafka_topic, &self.kafka_group_id)
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        let initial = Duration::from_millis(self.fetch_retry_backoff_ms);
        ConsumerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            backoff: BackoffConfig {
                initial_backoff: initial,
                max_backoff: Duration::from_millis(self.fetch_retry_max_backoff_ms).max(initial),
                backoff_multiplier: self.fetch_retry_multiplier.max(1.0),
                jitter: false,
                max_retries: self.max_fetch_retries,
            },
        }
    }

    /// Loops to start; at least one
    pub fn instances(&self) -> usize {
        self.consumer_instances.max(1)
    }
}
