//! Courier client
//!
//! Client-side call dispatch for Courier RPCs. A [`Connection`] turns a named
//! remote method invocation into either a blocking call or a cancellable
//! asynchronous call, computes each call's [`Deadline`] and translates
//! transport statuses into [`Error`]s.
//!
//! The network itself is behind the [`Transport`] trait; connections obtain
//! their transport from a [`Connector`].
//!
//! # Setup
//!
//! Values crossing the transport are encoded by the process-wide codec (see
//! [`codec`]). [`init`] installs the default JSON codec and is called by
//! [`Connection::connect`]; register a custom codec with
//! [`codec::register`] before connecting if you need one.

mod async_call;
pub mod codec;
mod connection;
mod deadline;
mod error;
mod handle;
mod options;
mod pending;
mod request;
pub mod status;
mod sync_call;
pub mod transport;

pub use async_call::{AsyncClient, AsyncMethodHandle};
pub use connection::{Connection, DEFAULT_METHOD, list_methods};
pub use deadline::Deadline;
pub use error::{ConstructionError, Error, StatusCode};
pub use options::{CallOptions, CallOverrides, ConnectionConfig};
pub use pending::{CallFuture, CallState};
pub use request::{Args, CallRequest};
pub use status::Status;
pub use sync_call::MethodHandle;
pub use transport::{Address, Connector, FailureCallback, SuccessCallback, Transport};

pub use serde_json::Value;
pub use tokio_util::sync::CancellationToken;

/// Result of a remote call.
pub type CallResult<T = Value> = Result<T, Error>;

/// One-time library initialization: installs the default value codec unless
/// one was registered already. Idempotent.
pub fn init() {
    codec::install_default();
}
