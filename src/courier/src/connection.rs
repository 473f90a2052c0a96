use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::async_call::AsyncClient;
use crate::sync_call::SyncDispatcher;
use crate::transport::Connector;
use crate::{
    Args, CallOptions, CallOverrides, ConnectionConfig, ConstructionError, Error, MethodHandle,
    Transport, status,
};

/// Method name used when a connection itself is called, see [`Connection::call`].
pub const DEFAULT_METHOD: &str = "__call__";

/// A client connection to a Courier server.
///
/// Calls are made by method name, either blocking ([`Connection::invoke`])
/// or asynchronously through [`Connection::futures`]. The connection owns
/// its transport and shuts it down exactly once, on [`Connection::shutdown`]
/// or when dropped.
///
/// ```
/// # use courier::{Connection, ConnectionConfig, args};
/// # fn example(connector: std::sync::Arc<dyn courier::Connector>) -> Result<(), Box<dyn std::error::Error>> {
/// let connection = ConnectionConfig::new("my_server").connect(connector)?;
///
/// // Blocking
/// let sum = connection.invoke("add", args![4, 7])?;
///
/// // Asynchronous
/// let future = connection.futures().invoke("add", args![4, 7]);
/// let sum = future.wait()?;
/// # Ok(())
/// # }
/// ```
pub struct Connection {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    transport: Arc<dyn Transport>,
    sync: SyncDispatcher,
    futures: AsyncClient,
    shut_down: AtomicBool,
}

impl Connection {
    /// Connect to `config.address()` with a transport built by `connector`.
    ///
    /// Initializes the library (see [`crate::init`]) if that has not
    /// happened yet. Construction failures are returned as they are.
    pub fn connect(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ConstructionError> {
        crate::init();

        let address = config.parse_address()?;
        let transport = connector.connect(&address, config.options().load_balancing_policy.as_deref())?;
        tracing::debug!(%address, options = ?config.options(), "connected");

        let options = Arc::new(config.options().clone());
        Ok(Self {
            sync: SyncDispatcher::new(transport.clone(), options.clone()),
            futures: AsyncClient::new(transport.clone(), options),
            config,
            connector,
            transport,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Build an equivalent connection from this one's construction
    /// parameters. The new connection gets its own transport.
    pub fn reconnect(&self) -> Result<Self, ConstructionError> {
        Self::connect(self.config.clone(), self.connector.clone())
    }

    /// The parameters this connection was constructed from.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn address(&self) -> &str {
        self.config.address()
    }

    pub fn options(&self) -> &CallOptions {
        self.config.options()
    }

    /// The blocking handle for `method`. Repeated lookups return the same handle.
    pub fn method(&self, method: &str) -> Arc<MethodHandle> {
        self.sync.handle(method)
    }

    /// Call `method` and block until it returns.
    pub fn invoke(&self, method: &str, args: Args) -> Result<Value, Error> {
        self.method(method).call(args)
    }

    /// Call `method` with per-call overrides and block until it returns.
    pub fn invoke_with(
        &self,
        method: &str,
        args: Args,
        overrides: &CallOverrides,
    ) -> Result<Value, Error> {
        self.method(method).call_with(args, overrides)
    }

    /// Call `method` and deserialize the result.
    pub fn invoke_as<T: DeserializeOwned>(&self, method: &str, args: Args) -> Result<T, Error> {
        self.method(method).call_as(args)
    }

    /// Call the server's default entry method.
    pub fn call(&self, args: Args) -> Result<Value, Error> {
        self.invoke(DEFAULT_METHOD, args)
    }

    /// The asynchronous variant of this connection.
    pub fn futures(&self) -> &AsyncClient {
        &self.futures
    }

    /// Names of the methods the server exposes, in the server's order.
    pub fn list_methods(&self) -> Result<Vec<String>, Error> {
        self.transport.list_methods().map_err(status::translate)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Shut the transport down. Safe to call more than once; only the first
    /// call has an effect. Calls still in flight may fail afterwards.
    ///
    /// Method handles stay cached for the connection's lifetime; calls made
    /// through them after shutdown fail with the transport's error.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(
            address = %self.config.address(),
            sync_handles = self.sync.handles().len(),
            async_handles = self.futures.handles().len(),
            "shutting down connection"
        );
        self.transport.shutdown();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

/// Names of the methods exposed by the server behind `connection`.
pub fn list_methods(connection: &Connection) -> Result<Vec<String>, Error> {
    connection.list_methods()
}
