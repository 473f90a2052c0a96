//! Error types surfaced by the client.
//!
//! Every failed remote call, synchronous or asynchronous, surfaces as an
//! [`Error`]: a [`StatusCode`] plus a human readable message, optionally with
//! structured `data` and the transport failure that caused it.
//!
//! Failures while *constructing* a connection are reported separately as
//! [`ConstructionError`] and are never translated into an [`Error`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Canonical RPC status codes.
///
/// The numeric values match the codes transports put on the wire, so
/// [`StatusCode::from_i32`] and [`StatusCode::as_i32`] round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum StatusCode {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl StatusCode {
    /// Convert a numeric code. Values outside the canonical range map to [`StatusCode::Unknown`].
    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => StatusCode::Ok,
            1 => StatusCode::Cancelled,
            2 => StatusCode::Unknown,
            3 => StatusCode::InvalidArgument,
            4 => StatusCode::DeadlineExceeded,
            5 => StatusCode::NotFound,
            6 => StatusCode::AlreadyExists,
            7 => StatusCode::PermissionDenied,
            8 => StatusCode::ResourceExhausted,
            9 => StatusCode::FailedPrecondition,
            10 => StatusCode::Aborted,
            11 => StatusCode::OutOfRange,
            12 => StatusCode::Unimplemented,
            13 => StatusCode::Internal,
            14 => StatusCode::Unavailable,
            15 => StatusCode::DataLoss,
            16 => StatusCode::Unauthenticated,
            _ => StatusCode::Unknown,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// The canonical upper-case name, e.g. `UNAVAILABLE`.
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Aborted => "ABORTED",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
            StatusCode::Unimplemented => "UNIMPLEMENTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DataLoss => "DATA_LOSS",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<i32> for StatusCode {
    fn from(code: i32) -> Self {
        StatusCode::from_i32(code)
    }
}

/// The error returned by a failed remote call.
///
/// `Display` renders `"{CODE}: {message}"`. The transport failure the error
/// was translated from, if any, is available through
/// [`std::error::Error::source`].
#[derive(Clone)]
pub struct Error {
    code: StatusCode,
    message: String,
    data: Option<serde_json::Value>,
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            source: None,
        }
    }

    /// The call was cancelled by the caller.
    pub fn cancelled() -> Self {
        Self::new(StatusCode::Cancelled, "call cancelled")
    }

    pub fn deadline_exceeded() -> Self {
        Self::new(StatusCode::DeadlineExceeded, "deadline exceeded")
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidArgument, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }

    /// Wrap an arbitrary error as an `Internal` error, keeping it as the cause.
    pub fn into_internal_error(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(StatusCode::Internal, err.to_string()).with_source(err)
    }

    /// Attach structured data to the error.
    pub fn with_data(mut self, data: impl Into<serde_json::Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Record the error that caused this one.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == StatusCode::Cancelled
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("data", &self.data)
            .field("source", &self.source.as_ref().map(|s| s.to_string()))
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::new(StatusCode::InvalidArgument, err.to_string()).with_source(err)
    }
}

/// Failure to construct a connection.
///
/// These are reported as-is and are never translated into an [`Error`].
#[derive(Debug, thiserror::Error)]
pub enum ConstructionError {
    #[error("invalid server address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("no server registered under the name `{0}`")]
    UnknownService(String),

    #[error("invalid connection config: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    #[error("failed to connect to `{address}`")]
    Connect {
        address: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}
