use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::DecodeError;

/// A single payment event flowing from intake to the ledger
///
/// Fields are private: once built, an event is never mutated. Components that
/// need a different event construct a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPaymentEvent")]
pub struct PaymentEvent {
    user_id: String,
    amount: i64,
    /// `None` means the status is not yet determined
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
}

/// Shape accepted off the wire before required fields are checked
#[derive(Debug, Deserialize)]
pub(crate) struct RawPaymentEvent {
    user_id: Option<String>,
    amount: Option<i64>,
    #[serde(default)]
    status: Option<String>,
}

/// Semantic problems with an event that decoded successfully
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("user_id must not be empty")]
    EmptyUserId,

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(i64),
}

impl PaymentEvent {
    pub fn new(user_id: impl Into<String>, amount: i64) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
            status: None,
        }
    }

    pub fn with_status(self, status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..self
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Key used to route the event to its partition
    pub fn partition_key(&self) -> &[u8] {
        self.user_id.as_bytes()
    }

    /// Reject events that are well-formed but cannot be stored
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.user_id.is_empty() {
            return Err(ValidationError::EmptyUserId);
        }
        if self.amount <= 0 {
            return Err(ValidationError::NonPositiveAmount(self.amount));
        }
        Ok(())
    }
}

impl TryFrom<RawPaymentEvent> for PaymentEvent {
    type Error = DecodeError;

    fn try_from(raw: RawPaymentEvent) -> Result<Self, Self::Error> {
        let user_id = raw.user_id.ok_or(DecodeError::MissingField("user_id"))?;
        let amount = raw.amount.ok_or(DecodeError::MissingField("amount"))?;

        Ok(Self {
            user_id,
            amount,
            status: raw.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert_eq!(PaymentEvent::new("u1", 1).validate(), Ok(()));
        assert_eq!(
            PaymentEvent::new("", 100).validate(),
            Err(ValidationError::EmptyUserId)
        );
        assert_eq!(
            PaymentEvent::new("u1", 0).validate(),
            Err(ValidationError::NonPositiveAmount(0))
        );
        assert_eq!(
            PaymentEvent::new("u1", -10).validate(),
            Err(ValidationError::NonPositiveAmount(-10))
        );
    }

    #[test]
    fn test_with_status_builds_new_event() {
        let pending = PaymentEvent::new("u1", 100);
        let settled = pending.clone().with_status("settled");

        assert_eq!(pending.status(), None);
        assert_eq!(settled.status(), Some("settled"));
        assert_eq!(settled.user_id(), "u1");
        assert_eq!(settled.amount(), 100);
    }

    #[test]
    fn test_serde_deserialize_enforces_required_fields() {
        let err = serde_json::from_str::<PaymentEvent>(r#"{"amount":100}"#).unwrap_err();
        assert!(err.to_string().contains("user_id"));

        let event: PaymentEvent =
            serde_json::from_str(r#"{"user_id":"u9","amount":3,"status":"new"}"#).unwrap();
        assert_eq!(event.partition_key(), b"u9");
        assert_eq!(event.status(), Some("new"));
    }
}
