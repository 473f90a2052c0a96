use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::handle::HandleCache;
use crate::{Args, CallOptions, CallOverrides, CallRequest, Error, Transport, status};

/// A blocking call handle bound to one method of one connection.
///
/// Obtained from [`Connection::method`](crate::Connection::method); repeated
/// lookups of the same name return the same handle.
pub struct MethodHandle {
    method: String,
    transport: Arc<dyn Transport>,
    options: Arc<CallOptions>,
}

impl std::fmt::Debug for MethodHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodHandle")
            .field("method", &self.method)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl MethodHandle {
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Call the method and block until it returns.
    pub fn call(&self, args: Args) -> Result<Value, Error> {
        self.call_with(args, &CallOverrides::default())
    }

    /// Call the method with per-call overrides of the connection's options.
    pub fn call_with(&self, args: Args, overrides: &CallOverrides) -> Result<Value, Error> {
        let request = build_request(&self.method, args, &self.options, overrides);
        tracing::debug!(
            method = %self.method,
            deadline = ?request.deadline,
            wait_for_ready = request.wait_for_ready,
            "dispatching blocking call"
        );
        self.transport.call(request).map_err(|status| {
            let err = status::translate(status);
            tracing::warn!(method = %self.method, %err, "call failed");
            err
        })
    }

    /// Call the method and deserialize its result.
    pub fn call_as<T: DeserializeOwned>(&self, args: Args) -> Result<T, Error> {
        let value = self.call(args)?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Builds and caches [`MethodHandle`]s for a connection.
pub(crate) struct SyncDispatcher {
    transport: Arc<dyn Transport>,
    options: Arc<CallOptions>,
    handles: HandleCache<MethodHandle>,
}

impl SyncDispatcher {
    pub(crate) fn new(transport: Arc<dyn Transport>, options: Arc<CallOptions>) -> Self {
        Self {
            transport,
            options,
            handles: HandleCache::new(),
        }
    }

    pub(crate) fn handle(&self, method: &str) -> Arc<MethodHandle> {
        self.handles.get_or_insert_with(method, || MethodHandle {
            method: method.to_string(),
            transport: self.transport.clone(),
            options: self.options.clone(),
        })
    }

    pub(crate) fn handles(&self) -> &HandleCache<MethodHandle> {
        &self.handles
    }
}

/// Assemble the transport request for one call.
pub(crate) fn build_request(
    method: &str,
    args: Args,
    options: &CallOptions,
    overrides: &CallOverrides,
) -> CallRequest {
    let deadline = options.deadline_for(overrides);
    let (args, kwargs) = args.into_parts();
    CallRequest {
        method: method.to_string(),
        args,
        kwargs,
        deadline,
        wait_for_ready: overrides.wait_for_ready.unwrap_or(options.wait_for_ready),
        compress: overrides.compress.unwrap_or(options.compress),
        chunk_tensors: options.chunk_tensors,
    }
}
