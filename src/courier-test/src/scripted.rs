use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use courier::transport::{Address, Connector};
use courier::{
    CallRequest, CancellationToken, ConstructionError, FailureCallback, Status, SuccessCallback,
    Transport, Value,
};

/// One asynchronous call as seen by a [`ScriptedTransport`].
struct RecordedCall {
    token: CancellationToken,
    callbacks: Option<(SuccessCallback, FailureCallback)>,
}

#[derive(Default)]
struct Script {
    requests: Vec<CallRequest>,
    responses: VecDeque<Result<Value, Status>>,
    calls: Vec<RecordedCall>,
    methods: Vec<String>,
}

/// A transport that never does anything on its own.
///
/// Blocking calls return queued responses; asynchronous calls are recorded
/// and only complete when the test fires one of their callbacks.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
    shutdowns: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the result of the next blocking call.
    pub fn push_response(&self, response: Result<Value, Status>) {
        self.script().responses.push_back(response);
    }

    /// Set what `list_methods` reports.
    pub fn set_methods(&self, methods: impl IntoIterator<Item = impl Into<String>>) {
        self.script().methods = methods.into_iter().map(Into::into).collect();
    }

    /// Every request received so far, blocking and asynchronous, in order.
    pub fn requests(&self) -> Vec<CallRequest> {
        self.script().requests.clone()
    }

    pub fn last_request(&self) -> Option<CallRequest> {
        self.script().requests.last().cloned()
    }

    /// Number of asynchronous calls started.
    pub fn async_calls(&self) -> usize {
        self.script().calls.len()
    }

    /// The cancellation token handed back for the `index`th asynchronous call.
    pub fn token(&self, index: usize) -> Option<CancellationToken> {
        self.script().calls.get(index).map(|call| call.token.clone())
    }

    fn take_callbacks(&self, index: usize) -> Option<(SuccessCallback, FailureCallback)> {
        self.script()
            .calls
            .get_mut(index)
            .and_then(|call| call.callbacks.take())
    }

    /// Complete the `index`th asynchronous call successfully. Returns `false`
    /// if its callbacks were already used.
    pub fn fire_success(&self, index: usize, value: Value) -> bool {
        match self.take_callbacks(index) {
            Some((on_success, _)) => {
                on_success.call(value);
                true
            }
            None => false,
        }
    }

    /// Fail the `index`th asynchronous call. Returns `false` if its callbacks
    /// were already used.
    pub fn fire_failure(&self, index: usize, status: Status) -> bool {
        match self.take_callbacks(index) {
            Some((_, on_failure)) => {
                on_failure.call(status);
                true
            }
            None => false,
        }
    }

    /// How many times `shutdown` was called.
    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    fn call(&self, request: CallRequest) -> Result<Value, Status> {
        let mut script = self.script();
        script.requests.push(request);
        script
            .responses
            .pop_front()
            .unwrap_or_else(|| Err(Status::unavailable("no scripted response")))
    }

    fn call_async(
        &self,
        request: CallRequest,
        on_success: SuccessCallback,
        on_failure: FailureCallback,
    ) -> CancellationToken {
        let token = CancellationToken::new();
        let mut script = self.script();
        script.requests.push(request);
        script.calls.push(RecordedCall {
            token: token.clone(),
            callbacks: Some((on_success, on_failure)),
        });
        token
    }

    fn list_methods(&self) -> Result<Vec<String>, Status> {
        Ok(self.script().methods.clone())
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out a fresh [`ScriptedTransport`] on every connect.
#[derive(Default)]
pub struct ScriptedConnector {
    transports: Mutex<Vec<Arc<ScriptedTransport>>>,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn transports(&self) -> Vec<Arc<ScriptedTransport>> {
        self.transports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recently built transport.
    pub fn last(&self) -> Option<Arc<ScriptedTransport>> {
        self.transports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl Connector for ScriptedConnector {
    fn connect(
        &self,
        address: &Address,
        _load_balancing_policy: Option<&str>,
    ) -> Result<Arc<dyn Transport>, ConstructionError> {
        tracing::trace!(%address, "building scripted transport");
        let transport = ScriptedTransport::new();
        self.transports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(transport.clone());
        Ok(transport)
    }
}
