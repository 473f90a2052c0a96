//! The contract between the dispatch layer and the transport that performs
//! the actual network I/O.

use std::fmt;
use std::sync::Arc;

use boxfnonce::SendBoxFnOnce;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{CallRequest, ConstructionError, Status};

/// Invoked by the transport with the call's result.
pub type SuccessCallback = SendBoxFnOnce<'static, (Value,)>;

/// Invoked by the transport when the call fails.
pub type FailureCallback = SendBoxFnOnce<'static, (Status,)>;

/// A handle to the transport layer.
///
/// Implementations must be safe to use from many calls and threads at once.
pub trait Transport: Send + Sync + 'static {
    /// Perform a call, blocking the current thread until it completes.
    ///
    /// The transport is responsible for enforcing `request.deadline`.
    fn call(&self, request: CallRequest) -> Result<Value, Status>;

    /// Start a call and return immediately.
    ///
    /// Exactly one of `on_success` and `on_failure` may be invoked, from any
    /// thread and at any later time, or neither if the call is abandoned.
    /// Cancelling the returned token asks the transport to abandon the call.
    fn call_async(
        &self,
        request: CallRequest,
        on_success: SuccessCallback,
        on_failure: FailureCallback,
    ) -> CancellationToken;

    /// Names of the methods exposed by the server.
    fn list_methods(&self) -> Result<Vec<String>, Status>;

    /// Release the transport's resources. Must be idempotent.
    fn shutdown(&self);
}

/// Builds transports for connections.
///
/// A connection keeps its connector so it can be reconstructed with a fresh
/// transport, see [`Connection::reconnect`](crate::Connection::reconnect).
pub trait Connector: Send + Sync + 'static {
    fn connect(
        &self,
        address: &Address,
        load_balancing_policy: Option<&str>,
    ) -> Result<Arc<dyn Transport>, ConstructionError>;
}

/// Where a connection points.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// A raw network endpoint such as `localhost:9000`, `10.0.0.2:80` or a
    /// unix socket path.
    Endpoint(String),

    /// A logical server name, resolved outside of this crate.
    Service(String),
}

impl Address {
    /// Classify an address string.
    ///
    /// Strings starting with `/` or `localhost`, and `host:port` strings with
    /// a numeric port, are endpoints. Anything else is a service name,
    /// resolved by the connector. Only empty addresses and addresses
    /// containing whitespace are rejected.
    pub fn parse(address: &str) -> Result<Self, ConstructionError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ConstructionError::InvalidAddress {
                address: address.to_string(),
                reason: "address is empty".to_string(),
            });
        }
        if address.chars().any(char::is_whitespace) {
            return Err(ConstructionError::InvalidAddress {
                address: address.to_string(),
                reason: "address contains whitespace".to_string(),
            });
        }

        if address.starts_with('/') || address.starts_with("localhost") {
            return Ok(Address::Endpoint(address.to_string()));
        }

        match address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Address::Endpoint(address.to_string()))
            }
            _ => Ok(Address::Service(address.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Address::Endpoint(s) | Address::Service(s) => s,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
