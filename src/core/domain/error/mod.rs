use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Local code for network failures, aborted requests and closed sockets.
pub const TRANSPORT_ERROR_CODE: i64 = -32000;
/// Local code for requests that outlived the configured timeout.
pub const TIMEOUT_ERROR_CODE: i64 = -32001;
/// Local code for responses that could not be decoded. Kept apart from the
/// standard -32700 parse error, which backends report themselves.
pub const PROTOCOL_ERROR_CODE: i64 = -32002;

/// Where an [`RpcError`] came from.
///
/// Backend errors carry whatever code the server assigned; every other kind
/// is produced locally and uses one of the reserved codes above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorKind {
    /// The backend answered with a JSON-RPC error object.
    Backend,
    /// The request never completed: connect failure, HTTP status, send failure.
    Transport,
    /// The request outlived the configured timeout.
    Timeout,
    /// The socket closed (or was closed locally) before a response arrived.
    Closed,
    /// The response arrived but could not be decoded into the expected shape.
    Protocol,
}

/// Error returned by every JSON-RPC call, regardless of transport.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("RPC error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
    pub kind: RpcErrorKind,
}

impl RpcError {
    /// Wraps an error object reported by the backend.
    pub fn backend(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
            kind: RpcErrorKind::Backend,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::local(TRANSPORT_ERROR_CODE, message, RpcErrorKind::Transport)
    }

    pub fn timeout() -> Self {
        Self::local(TIMEOUT_ERROR_CODE, "Request timeout", RpcErrorKind::Timeout)
    }

    pub fn closed() -> Self {
        Self::local(TRANSPORT_ERROR_CODE, "WebSocket closed", RpcErrorKind::Closed)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::local(PROTOCOL_ERROR_CODE, message, RpcErrorKind::Protocol)
    }

    fn local(code: i64, message: impl Into<String>, kind: RpcErrorKind) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            kind,
        }
    }

    /// Returns true if the error was reported by the backend itself.
    #[must_use]
    pub fn is_backend(&self) -> bool {
        self.kind == RpcErrorKind::Backend
    }

    /// Returns true if the error was produced by the timeout guard.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind == RpcErrorKind::Timeout
    }

    /// Returns true if the socket went away before the response arrived.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.kind == RpcErrorKind::Closed
    }
}

/// The main error type for Komari client operations.
///
/// This enum represents all possible errors that can occur while talking
/// to a Komari backend: RPC failures, REST failures, authentication,
/// validation and configuration problems.
#[derive(Error, Debug)]
pub enum KomariError {
    /// A JSON-RPC call failed
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// A REST endpoint answered with an error envelope or unexpected status
    ///
    /// # Fields
    /// * `status` - HTTP status code, if the response got that far
    /// * `message` - Message reported by the backend or the client
    #[error("API error ({status:?}): {message}")]
    Api {
        status: Option<u16>,
        message: String,
    },

    /// Represents errors that occur during connection attempts
    ///
    /// # Fields
    /// * `0` - A description of what went wrong during the connection attempt
    #[error("Connection error: {0}")]
    Connection(String),

    /// Represents authentication failures
    ///
    /// # Fields
    /// * `0` - A description of the authentication failure
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Represents validation failures with detailed context
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// The liveness check at startup failed
    #[error("Backend service unavailable: {0}")]
    BackendUnavailable(String),

    /// Reading a configuration file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Specialized error type for validation failures.
///
/// This enum provides detailed context about why a validation
/// failed, including field-specific errors and format violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Represents a validation failure for a specific field
    ///
    /// # Fields
    /// * `field` - The name of the field that failed validation
    /// * `message` - A detailed message about why validation failed
    #[error("Field '{field}' validation failed: {message}")]
    Field { field: String, message: String },

    /// Represents format/syntax validation failures
    ///
    /// # Fields
    /// * `0` - Description of the format violation
    #[error("Format error: {0}")]
    Format(String),

    /// Represents violations of domain constraints
    ///
    /// # Fields
    /// * `0` - Description of the constraint violation
    #[error("Domain constraint violation: {0}")]
    ConstraintViolation(String),
}

impl ValidationError {
    pub(crate) fn field(field: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Field {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Type alias for Results that may fail with a KomariError
pub type KomariResult<T> = Result<T, KomariError>;

/// Type alias for Results of JSON-RPC calls
pub type RpcResult<T> = Result<T, RpcError>;
