use thiserror::Error;

use crate::types::BackendKind;

/// Failure to open or prove a backend session
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Network unreachable, DNS failure, refused connection
    #[error("{backend} backend unreachable: {message}")]
    Unreachable {
        backend: BackendKind,
        message: String,
    },

    /// Credentials were rejected
    #[error("{backend} backend rejected credentials: {message}")]
    AuthRejected {
        backend: BackendKind,
        message: String,
    },

    /// Session opened but the liveness probe did not answer
    #[error("{backend} liveness probe failed: {message}")]
    ProbeFailed {
        backend: BackendKind,
        message: String,
    },

    /// Connect or probe exceeded the configured timeout
    #[error("{backend} connect timeout after {timeout_ms}ms")]
    Timeout { backend: BackendKind, timeout_ms: u64 },

    /// The descriptor cannot be turned into a session
    #[error("Invalid configuration for {backend}: {message}")]
    InvalidConfiguration {
        backend: BackendKind,
        message: String,
    },
}

impl ConnectionError {
    pub fn backend(&self) -> BackendKind {
        match self {
            ConnectionError::Unreachable { backend, .. }
            | ConnectionError::AuthRejected { backend, .. }
            | ConnectionError::ProbeFailed { backend, .. }
            | ConnectionError::Timeout { backend, .. }
            | ConnectionError::InvalidConfiguration { backend, .. } => *backend,
        }
    }

    pub fn unreachable(backend: BackendKind, message: impl Into<String>) -> Self {
        ConnectionError::Unreachable {
            backend,
            message: message.into(),
        }
    }

    pub fn auth_rejected(backend: BackendKind, message: impl Into<String>) -> Self {
        ConnectionError::AuthRejected {
            backend,
            message: message.into(),
        }
    }

    pub fn probe_failed(backend: BackendKind, message: impl Into<String>) -> Self {
        ConnectionError::ProbeFailed {
            backend,
            message: message.into(),
        }
    }

    pub fn invalid_configuration(backend: BackendKind, message: impl Into<String>) -> Self {
        ConnectionError::InvalidConfiguration {
            backend,
            message: message.into(),
        }
    }
}

/// Failure of one query against an already configured backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The backend has no open session and could not get one
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Session dropped after the initial connect
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Backend-side timeout
    #[error("Query timeout after {0}ms")]
    Timeout(u64),

    /// Syntax error, unknown column, bad parameter binding
    #[error("Malformed query: {0}")]
    Malformed(String),

    /// An identifier failed the allow-list check
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The native query shape does not belong to this backend
    #[error("Operation not supported: {0}")]
    Unsupported(String),

    /// A backend value could not be converted
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Anything else the driver reported
    #[error("Query failed: {0}")]
    Failed(String),
}

impl QueryError {
    /// Whether a reconnect-and-retry may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QueryError::NotConnected(_) | QueryError::ConnectionLost(_) | QueryError::Timeout(_)
        )
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        QueryError::Unsupported(msg.into())
    }
}

impl From<ConnectionError> for QueryError {
    fn from(err: ConnectionError) -> Self {
        QueryError::NotConnected(err.to_string())
    }
}

/// Caller-supplied request failed a shape check before any backend call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    EmptyInput { field: &'static str },

    #[error("Please enter at least {min} keywords to compare")]
    TooFewTerms { min: usize, got: usize },

    #[error("At most {max} keywords can be compared, got {got}")]
    TooManyTerms { max: usize, got: usize },

    #[error("'{0}' is not an allowed identifier")]
    InvalidIdentifier(String),
}

/// Malformed or empty statistics input; always resolved to neutral values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    #[error("No records to aggregate")]
    EmptyInput,

    #[error("Field '{0}' is not part of the record schema")]
    UnknownField(String),

    #[error("Field '{0}' holds no numeric values")]
    NonNumeric(String),
}

/// Unified error type consumed by callers without branching on backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

impl DataError {
    /// Short explanation suitable for a text panel
    pub fn user_message(&self) -> String {
        match self {
            DataError::Connection(e) => format!("{} connection not available", e.backend().label()),
            DataError::Query(e) => format!("Query failed: {}", e),
            DataError::Validation(e) => e.to_string(),
            DataError::Aggregation(e) => format!("Statistics unavailable: {}", e),
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
