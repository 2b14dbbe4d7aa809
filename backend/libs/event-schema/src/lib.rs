/// Event schema for the payment pipeline
///
/// Defines the `PaymentEvent` record that the intake service publishes and the
/// ledger service consumes, together with its wire encoding. The encoding is
/// JSON; an absent `status` is omitted from the payload entirely so that
/// "not yet determined" never turns into `null` or `""` on the other side.
use thiserror::Error;

mod payment;

pub use payment::{PaymentEvent, ValidationError};

/// Topic the intake service publishes to by default
pub mod topics {
    pub const PAYMENT_EVENTS: &str = "payment_events";
}

/// Consumer group the ledger service joins by default
pub const DEFAULT_CONSUMER_GROUP: &str = "payment_group";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is empty")]
    Empty,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("malformed payload: {0}")]
    Malformed(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
#[error("failed to encode payment event: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Encode an event into its wire form
pub fn encode(event: &PaymentEvent) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(event)?)
}

/// Decode a wire payload into a fresh `PaymentEvent`
pub fn decode(bytes: &[u8]) -> Result<PaymentEvent, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let raw: payment::RawPaymentEvent =
        serde_json::from_slice(bytes).map_err(DecodeError::Malformed)?;

    PaymentEvent::try_from(raw)
}
