//! Error types for the event log

use std::time::Duration;
use thiserror::Error;

/// Failures while publishing a record
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// No acknowledgement arrived within the publish window
    #[error("timed out after {0:?} waiting for broker acknowledgement")]
    Timeout(Duration),

    /// No broker connection could be established
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// The publisher was already closed
    #[error("publisher is closed")]
    Closed,

    #[error("publish failed: {0}")]
    Other(String),
}

impl PublishError {
    /// Short label for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::Timeout(_) => "timeout",
            PublishError::BrokerUnavailable(_) => "broker_unavailable",
            PublishError::Closed => "closed",
            PublishError::Other(_) => "other",
        }
    }
}

/// Failures while fetching or committing records
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Transient broker or network failure; safe to retry
    #[error("transport error: {0}")]
    Transport(String),

    /// Offset commit was rejected
    #[error("commit failed: {0}")]
    Commit(String),

    /// The source could not be created or subscribed
    #[error("connection failed: {0}")]
    Connection(String),

    /// The source was already closed
    #[error("record source is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_error_kind_labels() {
        assert_eq!(PublishError::Timeout(Duration::from_secs(5)).kind(), "timeout");
        assert_eq!(
            PublishError::BrokerUnavailable("down".into()).kind(),
            "broker_unavailable"
        );
        assert_eq!(PublishError::Closed.kind(), "closed");
        assert_eq!(PublishError::Other("x".into()).kind(), "other");
    }

    #[test]
    fn test_publish_error_messages() {
        let err = PublishError::Timeout(Duration::from_secs(5));
        assert_eq!(
            err.to_string(),
            "timed out after 5s waiting for broker acknowledgement"
        );
        assert_eq!(
            PublishError::BrokerUnavailable("all brokers down".into()).to_string(),
            "broker unavailable: all brokers down"
        );
    }
}
