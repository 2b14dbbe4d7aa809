/// Configuration management
use event_log::KafkaProducerConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct IntakeConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_kafka_broker")]
    pub kafka_broker: String,
    #[serde(default = "default_kafka_topic")]
    pub kafka_topic: String,
    /// Upper bound on waiting for a broker acknowledgement
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_kafka_broker() -> String {
    "localhost:9092".to_string()
}

fn default_kafka_topic() -> String {
    event_schema::topics::PAYMENT_EVENTS.to_string()
}

fn default_publish_timeout_ms() -> u64 {
    5000
}

impl IntakeConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn producer_config(&self) -> KafkaProducerConfig {
        KafkaProducerConfig {
            brokers: self.kafka_broker.clone(),
            topic: self.kafka_topic.clone(),
            ack_timeout: Duration::from_millis(self.publish_timeout_ms),
        }
    }
}
