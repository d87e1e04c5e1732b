/// Error types for the Cassandra client
use std::io;
use thiserror::Error;
use tonic::Status;

/// Failures of the connection itself
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport not open")]
    NotOpen,

    #[error("Transport already open")]
    AlreadyOpen,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to connect: {0}")]
    ConnectFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Returns a stable error code for this error variant.
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::NotOpen => "NOT_OPEN",
            TransportError::AlreadyOpen => "ALREADY_OPEN",
            TransportError::InvalidAddress(_) => "INVALID_ADDRESS",
            TransportError::InvalidConfig(_) => "INVALID_CONFIG",
            TransportError::ConnectFailed(_) => "CONNECT_FAILED",
            TransportError::Io(_) => "IO_ERROR",
        }
    }
}

/// Errors raised by remote operations
#[derive(Error, Debug)]
pub enum CassandraError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Timed out: {0}")]
    TimedOut(String),

    #[error("Schema disagreement: {0}")]
    SchemaDisagreement(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Application error: {0}")]
    Application(String),
}

impl CassandraError {
    /// Returns a stable error code for this error variant.
    /// These codes can be used by callers for error classification.
    pub fn code(&self) -> &'static str {
        match self {
            CassandraError::InvalidRequest(_) => "INVALID_REQUEST",
            CassandraError::NotFound(_) => "NOT_FOUND",
            CassandraError::Unavailable(_) => "UNAVAILABLE",
            CassandraError::TimedOut(_) => "TIMED_OUT",
            CassandraError::SchemaDisagreement(_) => "SCHEMA_DISAGREEMENT",
            CassandraError::Authentication(_) => "AUTHENTICATION",
            CassandraError::Authorization(_) => "AUTHORIZATION",
            CassandraError::Transport(_) => "TRANSPORT",
            CassandraError::Application(_) => "APPLICATION",
        }
    }
}

pub type Result<T> = std::result::Result<T, CassandraError>;

/// Convert gRPC Status to CassandraError
impl From<Status> for CassandraError {
    fn from(status: Status) -> Self {
        let msg = status.message().to_string();

        match status.code() {
            tonic::Code::InvalidArgument => CassandraError::InvalidRequest(msg),
            tonic::Code::NotFound => CassandraError::NotFound(msg),
            tonic::Code::Unavailable => CassandraError::Unavailable(msg),
            tonic::Code::DeadlineExceeded | tonic::Code::Cancelled => CassandraError::TimedOut(msg),
            tonic::Code::Aborted => CassandraError::SchemaDisagreement(msg),
            tonic::Code::Unauthenticated => CassandraError::Authentication(msg),
            tonic::Code::PermissionDenied => CassandraError::Authorization(msg),
            _ => CassandraError::Application(msg),
        }
    }
}
