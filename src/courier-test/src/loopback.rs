use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::time::Duration;

use courier::codec::Codec;
use courier::transport::{Address, Connector};
use courier::{
    Args, CallRequest, CancellationToken, ConstructionError, Deadline, FailureCallback, Status,
    StatusCode, SuccessCallback, Transport, Value,
};
use fxhash::FxHashMap;
use serde_json::json;

use crate::MethodTable;

/// How often a call waiting for the server re-checks whether it was abandoned.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// An in-process server that loopback transports call into.
pub struct LoopbackServer {
    name: String,
    methods: RwLock<MethodTable>,
    available: Mutex<bool>,
    availability_changed: Condvar,
    calls: AtomicUsize,
}

impl LoopbackServer {
    pub fn new(name: impl Into<String>, methods: MethodTable) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            methods: RwLock::new(methods),
            available: Mutex::new(true),
            availability_changed: Condvar::new(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind (or rebind) a method while the server is running.
    pub fn bind(
        &self,
        name: impl Into<String>,
        method: impl Fn(Args) -> Result<Value, Status> + Send + Sync + 'static,
    ) {
        self.methods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(method));
    }

    /// Take the server offline or bring it back.
    pub fn set_available(&self, available: bool) {
        *self.available.lock().unwrap_or_else(PoisonError::into_inner) = available;
        self.availability_changed.notify_all();
    }

    /// Number of method invocations that reached a bound method.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn method_names(&self) -> Vec<String> {
        self.methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names()
    }

    /// Wait until the server is available, the deadline passes or the call
    /// is abandoned. `abandoned` returns the status to fail with once the
    /// caller gives up.
    fn wait_until_available(
        &self,
        request: &CallRequest,
        abandoned: &dyn Fn() -> Option<Status>,
    ) -> Result<(), Status> {
        let mut available = self.available.lock().unwrap_or_else(PoisonError::into_inner);
        while !*available {
            if !request.wait_for_ready {
                return Err(Status::unavailable(format!(
                    "server `{}` is not available",
                    self.name
                )));
            }
            if let Some(status) = abandoned() {
                return Err(status);
            }
            let wait = match request.deadline.remaining() {
                Some(remaining) if remaining.is_zero() => return Err(Status::deadline_exceeded()),
                Some(remaining) => remaining.min(READY_POLL_INTERVAL),
                None => READY_POLL_INTERVAL,
            };
            available = self
                .availability_changed
                .wait_timeout(available, wait)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Ok(())
    }

    /// Run one call to completion on the current thread.
    fn serve(
        &self,
        request: &CallRequest,
        codec: &dyn Codec,
        abandoned: &dyn Fn() -> Option<Status>,
    ) -> Result<Value, Status> {
        if request.deadline.has_elapsed() {
            return Err(Status::deadline_exceeded());
        }
        self.wait_until_available(request, abandoned)?;

        let method = self
            .methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.method)
            .ok_or_else(|| {
                Status::new(
                    StatusCode::Unimplemented,
                    format!("method `{}` is not bound on `{}`", request.method, self.name),
                )
            })?;

        let args = round_trip(codec, &json!({"positional": request.args, "named": request.kwargs}))?;
        let args: Args = serde_json::from_value(args)
            .map_err(|e| Status::from_native(StatusCode::InvalidArgument, e))?;

        self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(server = %self.name, method = %request.method, "running bound method");
        let result = method(args)?;

        if request.deadline.has_elapsed() {
            return Err(Status::deadline_exceeded());
        }
        round_trip(codec, &result)
    }
}

impl std::fmt::Debug for LoopbackServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackServer")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .finish()
    }
}

/// Push a value through the codec as it would cross the wire.
fn round_trip(codec: &dyn Codec, value: &Value) -> Result<Value, Status> {
    let bytes = codec
        .encode(value)
        .map_err(|e| Status::from_native(StatusCode::Internal, e))?;
    codec
        .decode(&bytes)
        .map_err(|e| Status::from_native(StatusCode::DataLoss, e))
}

/// Why a call whose token was cancelled stopped.
fn abandoned_status(shut_down: &AtomicBool) -> Status {
    if shut_down.load(Ordering::Acquire) {
        LoopbackTransport::shut_down_status()
    } else {
        Status::cancelled()
    }
}

async fn sleep_until(deadline: Deadline) {
    match deadline.remaining() {
        Some(remaining) => tokio::time::sleep(remaining).await,
        None => std::future::pending().await,
    }
}

/// A transport that calls straight into a [`LoopbackServer`].
///
/// Asynchronous calls run on the transport's own runtime, so their callbacks
/// arrive on threads the caller does not control.
pub struct LoopbackTransport {
    server: Arc<LoopbackServer>,
    codec: Arc<dyn Codec>,
    runtime: Mutex<Option<tokio::runtime::Runtime>>,
    handle: tokio::runtime::Handle,
    /// Parent of every call's cancellation token; cancelled on shutdown.
    in_flight: CancellationToken,
    shut_down: Arc<AtomicBool>,
    shutdowns: AtomicUsize,
}

impl LoopbackTransport {
    pub fn new(server: Arc<LoopbackServer>) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("courier-loopback")
            .enable_all()
            .build()?;
        Ok(Self {
            server,
            codec: courier::codec::install_default(),
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            in_flight: CancellationToken::new(),
            shut_down: Arc::new(AtomicBool::new(false)),
            shutdowns: AtomicUsize::new(0),
        })
    }

    pub fn server(&self) -> &Arc<LoopbackServer> {
        &self.server
    }

    /// How many times `shutdown` actually shut the transport down.
    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    fn shut_down_status() -> Status {
        Status::unavailable("transport has been shut down")
    }
}

impl Transport for LoopbackTransport {
    fn call(&self, request: CallRequest) -> Result<Value, Status> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Self::shut_down_status());
        }
        let shut_down = self.shut_down.clone();
        self.server.serve(&request, &*self.codec, &move || {
            shut_down
                .load(Ordering::Acquire)
                .then(Self::shut_down_status)
        })
    }

    fn call_async(
        &self,
        request: CallRequest,
        on_success: SuccessCallback,
        on_failure: FailureCallback,
    ) -> CancellationToken {
        let token = self.in_flight.child_token();
        if self.shut_down.load(Ordering::Acquire) {
            on_failure.call(Self::shut_down_status());
            return token;
        }

        let server = self.server.clone();
        let codec = self.codec.clone();
        let shut_down = self.shut_down.clone();
        let call_token = token.clone();
        self.handle.spawn(async move {
            let deadline = request.deadline;
            let abandoned = {
                let call_token = call_token.clone();
                let shut_down = shut_down.clone();
                move || {
                    call_token
                        .is_cancelled()
                        .then(|| abandoned_status(&shut_down))
                }
            };
            let work = tokio::task::spawn_blocking(move || server.serve(&request, &*codec, &abandoned));

            let result = tokio::select! {
                biased;
                _ = call_token.cancelled() => Err(abandoned_status(&shut_down)),
                _ = sleep_until(deadline) => Err(Status::deadline_exceeded()),
                joined = work => match joined {
                    Ok(result) => result,
                    Err(join_error) => Err(Status::from_native(StatusCode::Internal, join_error)),
                },
            };

            match result {
                Ok(value) => on_success.call(value),
                Err(status) => on_failure.call(status),
            }
        });
        token
    }

    fn list_methods(&self) -> Result<Vec<String>, Status> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Self::shut_down_status());
        }
        Ok(self.server.method_names())
    }

    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(server = %self.server.name, "loopback transport shutting down");
        self.in_flight.cancel();
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.shutdown();
        let runtime = self
            .runtime
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
    }
}

/// Resolves addresses to registered [`LoopbackServer`]s.
#[derive(Default)]
pub struct LoopbackConnector {
    servers: RwLock<FxHashMap<String, Arc<LoopbackServer>>>,
    transports: Mutex<Vec<Arc<LoopbackTransport>>>,
    policies: Mutex<Vec<Option<String>>>,
}

impl LoopbackConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A connector with `server` registered under its name.
    pub fn serving(server: Arc<LoopbackServer>) -> Arc<Self> {
        let connector = Self::new();
        connector.register(server);
        connector
    }

    pub fn register(&self, server: Arc<LoopbackServer>) {
        self.servers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(server.name.clone(), server);
    }

    /// Every transport built so far, oldest first.
    pub fn transports(&self) -> Vec<Arc<LoopbackTransport>> {
        self.transports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The load balancing policy passed with each connect, oldest first.
    pub fn policies(&self) -> Vec<Option<String>> {
        self.policies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Connector for LoopbackConnector {
    fn connect(
        &self,
        address: &Address,
        load_balancing_policy: Option<&str>,
    ) -> Result<Arc<dyn Transport>, ConstructionError> {
        let server = self
            .servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address.as_str())
            .cloned()
            .ok_or_else(|| ConstructionError::UnknownService(address.to_string()))?;

        let transport = Arc::new(LoopbackTransport::new(server).map_err(|e| {
            ConstructionError::Connect {
                address: address.to_string(),
                source: Box::new(e),
            }
        })?);

        self.transports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(transport.clone());
        self.policies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(load_balancing_policy.map(str::to_string));
        Ok(transport)
    }
}
