use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use event_log::PublishError;
use event_schema::{DecodeError, EncodeError};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IntakeError>;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("invalid payload")]
    InvalidPayload(#[source] DecodeError),

    #[error("failed to encode event")]
    Encode(#[from] EncodeError),

    #[error("event delivery failed: {0}")]
    Delivery(#[from] PublishError),
}

impl IntakeError {
    /// Label recorded on the request counter
    pub fn outcome(&self) -> &'static str {
        match self {
            IntakeError::InvalidPayload(_) => "invalid",
            IntakeError::Encode(_) => "encode_failed",
            IntakeError::Delivery(_) => "delivery_failed",
        }
    }
}

impl From<DecodeError> for IntakeError {
    fn from(err: DecodeError) -> Self {
        IntakeError::InvalidPayload(err)
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ResponseError for IntakeError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            IntakeError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            IntakeError::Encode(_) | IntakeError::Delivery(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
