use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestionError>;

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Event log error: {0}")]
    EventLog(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Outcome of a single failed publish to the pub/sub control plane.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ForwardError {
    /// The sidecar answered, but not with the accepted status.
    #[error("publish rejected with status {status}")]
    Rejected { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ForwardError {
    fn from(err: reqwest::Error) -> Self {
        ForwardError::Transport(err.to_string())
    }
}

impl From<rdkafka::error::KafkaError> for IngestionError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        IngestionError::EventLog(err.to_string())
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl ResponseError for IngestionError {
    fn error_response(&self) -> HttpResponse {
        let code = self.status_code();
        HttpResponse::build(code).json(ErrorResponse {
            error: self.to_string(),
            code: code.as_u16(),
        })
    }

    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
