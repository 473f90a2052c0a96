//! Translation of transport statuses into [`Error`]s.
//!
//! Transports report failures as a [`Status`]: a code, a message and,
//! optionally, the transport-native error that produced it. [`translate`]
//! turns a status into the client-visible [`Error`], keeping the status (and
//! through it the native error) as the error's source so the diagnostic chain
//! is never lost. Both dispatch modes go through the same function.

use std::fmt;

use crate::{Error, StatusCode};

/// Failure reported by a transport.
#[derive(Debug)]
pub struct Status {
    code: StatusCode,
    message: String,
    native: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            native: None,
        }
    }

    /// A status wrapping a transport-native error.
    pub fn from_native(
        code: StatusCode,
        native: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: native.to_string(),
            native: Some(Box::new(native)),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(StatusCode::Cancelled, "call cancelled")
    }

    pub fn deadline_exceeded() -> Self {
        Self::new(StatusCode::DeadlineExceeded, "deadline exceeded")
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {} ({}): {}", self.code, self.code.as_i32(), self.message)
    }
}

impl std::error::Error for Status {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.native
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Translate a transport status into the error surfaced to callers.
///
/// The returned error has the status' code and message; the status itself
/// becomes the error's source.
pub fn translate(status: Status) -> Error {
    let code = status.code;
    let message = status.message.clone();
    Error::new(code, message).with_source(status)
}

/// Translate a transport-native error that did not come with a status.
pub fn translate_native(
    code: StatusCode,
    native: impl std::error::Error + Send + Sync + 'static,
) -> Error {
    translate(Status::from_native(code, native))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn translated_error_keeps_code_and_message() {
        for code in 0..=16 {
            let code = StatusCode::from_i32(code);
            let err = translate(Status::new(code, "something broke"));
            assert_eq!(err.code(), code);
            assert_eq!(err.message(), "something broke");
            assert!(err.to_string().contains("something broke"));
        }
    }

    #[test]
    fn translated_error_chains_to_status_and_native_cause() {
        let native = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset");
        let err = translate_native(StatusCode::Unavailable, native);
        assert_eq!(err.code(), StatusCode::Unavailable);

        let status = err
            .source()
            .and_then(|s| s.downcast_ref::<Status>())
            .expect("status should be the first cause");
        assert_eq!(status.code(), StatusCode::Unavailable);

        let io = status
            .source()
            .and_then(|s| s.downcast_ref::<std::io::Error>())
            .expect("native error should be preserved");
        assert_eq!(io.kind(), std::io::ErrorKind::ConnectionReset);
    }
}
