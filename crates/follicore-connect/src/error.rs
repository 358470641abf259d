//! Error types for the follicore-connect crate

use follicore_core_resilience::{RetryableError, StatusCode};
use std::error::Error as _;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Failures surfaced by the inference client
///
/// Cloneable so the same cause can be fanned out to every lifecycle
/// subscriber through [`crate::ConnectionEvent::Error`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Endpoint unreachable, handshake failed or channel lost (UNAVAILABLE)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connect handshake or per-call deadline elapsed (DEADLINE_EXCEEDED)
    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    /// Remote call completed with a non-OK status
    #[error("RPC failed with {code}: {message}")]
    Rpc {
        code: StatusCode,
        message: String,
        cause: Option<String>,
    },

    /// Local guard rejected the call before anything was sent
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Invalid client configuration, or a service/method the schema does not declare
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema file could not be read or decoded
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl ClientError {
    /// Status code this error corresponds to on the wire
    pub fn code(&self) -> StatusCode {
        match self {
            ClientError::Connection(_) => StatusCode::Unavailable,
            ClientError::Timeout(_) => StatusCode::DeadlineExceeded,
            ClientError::Rpc { code, .. } => *code,
            ClientError::Precondition(_) => StatusCode::FailedPrecondition,
            ClientError::Config(_) | ClientError::Schema(_) | ClientError::InvalidEndpoint(_) => {
                StatusCode::InvalidArgument
            }
        }
    }

    /// Whether this error indicates the channel itself is unusable
    pub fn is_connection(&self) -> bool {
        matches!(self, ClientError::Connection(_))
    }
}

impl RetryableError for ClientError {
    fn is_retryable(&self) -> bool {
        match self {
            ClientError::Connection(_) | ClientError::Timeout(_) => true,
            ClientError::Rpc { code, .. } => code.is_retryable(),
            ClientError::Precondition(_)
            | ClientError::Config(_)
            | ClientError::Schema(_)
            | ClientError::InvalidEndpoint(_) => false,
        }
    }
}

impl From<tonic::Status> for ClientError {
    fn from(status: tonic::Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            tonic::Code::Unavailable => ClientError::Connection(message),
            tonic::Code::DeadlineExceeded => ClientError::Timeout(message),
            code => ClientError::Rpc {
                code: StatusCode::from_i32(code as i32),
                message,
                cause: status.source().map(|e| e.to_string()),
            },
        }
    }
}

impl From<tonic::transport::Error> for ClientError {
    fn from(err: tonic::transport::Error) -> Self {
        match err.source() {
            Some(source) => ClientError::Connection(format!("{}: {}", err, source)),
            None => ClientError::Connection(err.to_string()),
        }
    }
}

impl From<prost::DecodeError> for ClientError {
    fn from(err: prost::DecodeError) -> Self {
        ClientError::Schema(format!("Failed to decode descriptor set: {}", err))
    }
}
