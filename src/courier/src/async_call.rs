use std::sync::Arc;

use boxfnonce::SendBoxFnOnce;
use serde_json::Value;

use crate::connection::DEFAULT_METHOD;
use crate::handle::HandleCache;
use crate::pending::PendingCall;
use crate::sync_call::build_request;
use crate::{Args, CallFuture, CallOptions, CallOverrides, Status, Transport, status};

/// The asynchronous view of a connection.
///
/// Every call returns a [`CallFuture`] immediately. Obtained from
/// [`Connection::futures`](crate::Connection::futures).
pub struct AsyncClient {
    transport: Arc<dyn Transport>,
    options: Arc<CallOptions>,
    handles: HandleCache<AsyncMethodHandle>,
}

impl AsyncClient {
    pub(crate) fn new(transport: Arc<dyn Transport>, options: Arc<CallOptions>) -> Self {
        Self {
            transport,
            options,
            handles: HandleCache::new(),
        }
    }

    /// The handle for `method`. Repeated lookups return the same handle.
    pub fn method(&self, method: &str) -> Arc<AsyncMethodHandle> {
        self.handles.get_or_insert_with(method, || AsyncMethodHandle {
            method: method.to_string(),
            transport: self.transport.clone(),
            options: self.options.clone(),
        })
    }

    /// Start a call to `method`.
    pub fn invoke(&self, method: &str, args: Args) -> CallFuture {
        self.method(method).call(args)
    }

    /// Start a call to `method` with per-call overrides.
    pub fn invoke_with(&self, method: &str, args: Args, overrides: &CallOverrides) -> CallFuture {
        self.method(method).call_with(args, overrides)
    }

    /// Start a call to the server's default entry method.
    pub fn call(&self, args: Args) -> CallFuture {
        self.invoke(DEFAULT_METHOD, args)
    }

    pub(crate) fn handles(&self) -> &HandleCache<AsyncMethodHandle> {
        &self.handles
    }
}

impl std::fmt::Debug for AsyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncClient")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A non-blocking call handle bound to one method of one connection.
pub struct AsyncMethodHandle {
    method: String,
    transport: Arc<dyn Transport>,
    options: Arc<CallOptions>,
}

impl AsyncMethodHandle {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn call(&self, args: Args) -> CallFuture {
        self.call_with(args, &CallOverrides::default())
    }

    pub fn call_with(&self, args: Args, overrides: &CallOverrides) -> CallFuture {
        let call = PendingCall::new(&self.method);
        let request = build_request(&self.method, args, &self.options, overrides);
        tracing::debug!(
            id = %call.id(),
            method = %self.method,
            deadline = ?request.deadline,
            wait_for_ready = request.wait_for_ready,
            "dispatching asynchronous call"
        );

        let on_success = {
            let call = call.clone();
            SendBoxFnOnce::new(move |value: Value| {
                call.fulfil(value);
            })
        };
        let on_failure = {
            let call = call.clone();
            SendBoxFnOnce::new(move |status: Status| {
                let err = status::translate(status);
                tracing::debug!(id = %call.id(), %err, "asynchronous call failed");
                call.fail(err);
            })
        };

        let token = self.transport.call_async(request, on_success, on_failure);
        CallFuture::new(call, token)
    }
}

impl std::fmt::Debug for AsyncMethodHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncMethodHandle")
            .field("method", &self.method)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
